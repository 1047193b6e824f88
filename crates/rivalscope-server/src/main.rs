mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use rivalscope_core::{AnalysisMode, AppConfig};
use rivalscope_ledger::{MemoryStore, PgStore, PoolConfig, Store};
use rivalscope_pipeline::{AnalysisHandoff, Coordinator};
use rivalscope_sources::CollectorRegistry;
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::RateLimitState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(rivalscope_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        env = %config.env,
        stages = ?config.stages,
        analysis_mode = ?config.analysis_mode,
        "starting rivalscope-server"
    );

    let store = open_store(&config).await?;
    let handoff = AnalysisHandoff::new(Arc::clone(&store));
    let coordinator = build_coordinator(&config, &store, &handoff)?;
    let _scheduler = start_scheduler(&config, handoff).await?;

    let state = AppState { store, coordinator };
    let app = build_app(
        state,
        config.stages,
        RateLimitState::per_minute(config.api_rate_limit_per_min),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise a process-local store.
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using in-memory store (state is lost on exit)");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = rivalscope_ledger::connect_pool(url, PoolConfig::from_app_config(config)).await?;
    let applied = rivalscope_ledger::run_migrations(&pool).await?;
    tracing::info!(applied, "postgres store ready");
    Ok(Arc::new(PgStore::new(pool)))
}

/// The coordinator exists only when this process runs collection. In trigger
/// mode with the analysis stage enabled it calls the handoff on completion.
fn build_coordinator(
    config: &AppConfig,
    store: &Arc<dyn Store>,
    handoff: &AnalysisHandoff,
) -> anyhow::Result<Option<Coordinator>> {
    if !config.stages.collection {
        return Ok(None);
    }

    let registry = Arc::new(CollectorRegistry::from_app_config(config)?);
    let coordinator = if config.stages.analysis && config.analysis_mode == AnalysisMode::Trigger {
        Coordinator::with_hook(registry, Arc::clone(store), Arc::new(handoff.clone()))
    } else {
        Coordinator::new(registry, Arc::clone(store))
    };
    Ok(Some(coordinator))
}

/// The analysis sweep runs when analysis is enabled and nothing triggers it
/// in-process.
async fn start_scheduler(
    config: &AppConfig,
    handoff: AnalysisHandoff,
) -> anyhow::Result<Option<JobScheduler>> {
    let polls = config.stages.analysis
        && (!config.stages.collection || config.analysis_mode == AnalysisMode::Poll);
    if !polls {
        return Ok(None);
    }
    let scheduler = scheduler::build_scheduler(handoff, &config.analysis_poll_cron).await?;
    Ok(Some(scheduler))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
