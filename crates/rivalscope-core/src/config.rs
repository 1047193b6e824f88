use crate::app_config::{AnalysisMode, AppConfig, Environment, Stages};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = lookup("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
    let env = parse_environment(&or_default("RIVALSCOPE_ENV", "development"));

    let bind_addr = or_default("RIVALSCOPE_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("RIVALSCOPE_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("RIVALSCOPE_LOG_LEVEL", "info");

    let stages = parse_stages(&or_default("RIVALSCOPE_STAGES", "all"))
        .map_err(|reason| invalid("RIVALSCOPE_STAGES", reason))?;
    let analysis_mode = parse_analysis_mode(&or_default("RIVALSCOPE_ANALYSIS_MODE", "trigger"))
        .map_err(|reason| invalid("RIVALSCOPE_ANALYSIS_MODE", reason))?;
    let analysis_poll_cron = or_default("RIVALSCOPE_ANALYSIS_POLL_CRON", "*/5 * * * * *");

    let db_max_connections = parse_u32("RIVALSCOPE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("RIVALSCOPE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("RIVALSCOPE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source_timeout_secs = parse_u64("RIVALSCOPE_SOURCE_TIMEOUT_SECS", "15")?;
    if source_timeout_secs == 0 {
        return Err(invalid(
            "RIVALSCOPE_SOURCE_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let source_user_agent = or_default(
        "RIVALSCOPE_SOURCE_USER_AGENT",
        "rivalscope/0.1 (brand-intelligence)",
    );
    let source_max_retries = parse_u32("RIVALSCOPE_SOURCE_MAX_RETRIES", "3")?;
    let source_backoff_base_ms = parse_u64("RIVALSCOPE_SOURCE_BACKOFF_BASE_MS", "500")?;
    let source_min_interval_ms = parse_u64("RIVALSCOPE_SOURCE_MIN_INTERVAL_MS", "1000")?;

    let news_base_url = or_default("RIVALSCOPE_NEWS_BASE_URL", "https://news.google.com");
    let social_base_url = or_default("RIVALSCOPE_SOCIAL_BASE_URL", "https://www.reddit.com");
    let reviews_base_url = or_default("RIVALSCOPE_REVIEWS_BASE_URL", "http://127.0.0.1:8090");
    let website_url_template = or_default("RIVALSCOPE_WEBSITE_URL_TEMPLATE", "https://{subject}");
    if !website_url_template.contains("{subject}") {
        return Err(invalid(
            "RIVALSCOPE_WEBSITE_URL_TEMPLATE",
            "must contain the {subject} placeholder".to_string(),
        ));
    }

    let poll_interval_secs = parse_u64("RIVALSCOPE_POLL_INTERVAL_SECS", "5")?;
    let poll_timeout_secs = parse_u64("RIVALSCOPE_POLL_TIMEOUT_SECS", "300")?;
    let api_rate_limit_per_min = parse_usize("RIVALSCOPE_API_RATE_LIMIT_PER_MIN", "120")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        stages,
        analysis_mode,
        analysis_poll_cron,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source_timeout_secs,
        source_user_agent,
        source_max_retries,
        source_backoff_base_ms,
        source_min_interval_ms,
        news_base_url,
        social_base_url,
        reviews_base_url,
        website_url_template,
        poll_interval_secs,
        poll_timeout_secs,
        api_rate_limit_per_min,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

/// Parse a comma-separated stage list: `all`, `collection`, `analysis`.
fn parse_stages(s: &str) -> Result<Stages, String> {
    let mut stages = Stages {
        collection: false,
        analysis: false,
    };
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part {
            "all" => stages = Stages::ALL,
            "collection" => stages.collection = true,
            "analysis" => stages.analysis = true,
            other => return Err(format!("unknown stage {other:?}")),
        }
    }
    if !stages.collection && !stages.analysis {
        return Err("at least one stage must be enabled".to_string());
    }
    Ok(stages)
}

fn parse_analysis_mode(s: &str) -> Result<AnalysisMode, String> {
    match s {
        "trigger" => Ok(AnalysisMode::Trigger),
        "poll" => Ok(AnalysisMode::Poll),
        other => Err(format!("expected trigger or poll, got {other:?}")),
    }
}
