use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// How the analysis stage learns that collection finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// The coordinator invokes analysis directly when a job completes.
    Trigger,
    /// The analysis stage scans the ledger on a schedule.
    Poll,
}

/// Which stages this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub collection: bool,
    pub analysis: bool,
}

impl Stages {
    pub const ALL: Stages = Stages {
        collection: true,
        analysis: true,
    };
}

#[derive(Clone)]
pub struct AppConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub stages: Stages,
    pub analysis_mode: AnalysisMode,
    pub analysis_poll_cron: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub source_timeout_secs: u64,
    pub source_user_agent: String,
    pub source_max_retries: u32,
    pub source_backoff_base_ms: u64,
    pub source_min_interval_ms: u64,
    pub news_base_url: String,
    pub social_base_url: String,
    pub reviews_base_url: String,
    pub website_url_template: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub api_rate_limit_per_min: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("stages", &self.stages)
            .field("analysis_mode", &self.analysis_mode)
            .field("analysis_poll_cron", &self.analysis_poll_cron)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("source_user_agent", &self.source_user_agent)
            .field("source_max_retries", &self.source_max_retries)
            .field("source_backoff_base_ms", &self.source_backoff_base_ms)
            .field("source_min_interval_ms", &self.source_min_interval_ms)
            .field("news_base_url", &self.news_base_url)
            .field("social_base_url", &self.social_base_url)
            .field("reviews_base_url", &self.reviews_base_url)
            .field("website_url_template", &self.website_url_template)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_rate_limit_per_min", &self.api_rate_limit_per_min)
            .finish()
    }
}
