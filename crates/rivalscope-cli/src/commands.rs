//! Command handlers. Results go to stdout as JSON, progress to stderr.

use std::time::Duration;

use anyhow::Context;
use rivalscope_core::{AppConfig, ComparisonRequest, StageStatus};
use rivalscope_ledger::PoolConfig;
use rivalscope_pipeline::{PollerConfig, StatusPoller};
use serde::Serialize;
use uuid::Uuid;

use crate::client::ApiClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Starts a comparison on the server and waits for its analysis.
///
/// # Errors
///
/// Returns an error if the server rejects the request, either stage fails,
/// the server stays unreachable, or the poll budget runs out.
pub(crate) async fn run_compare(
    server: &str,
    config: &AppConfig,
    request: &ComparisonRequest,
) -> anyhow::Result<()> {
    let client = ApiClient::new(server, REQUEST_TIMEOUT)?;
    let started = client.start_collection(request).await?;
    eprintln!(
        "request {}: collection job {} {} (estimated {}s)",
        request.request_id, started.job_id, started.status, started.estimated_duration
    );

    let poller_config = PollerConfig::from_app_config(config);
    let poller = StatusPoller::new(client, poller_config);
    let result = poller
        .wait_for_result(&request.request_id, |phase| {
            eprintln!("{}...", phase.describe());
        })
        .await
        .with_context(|| format!("comparison {} did not complete", request.request_id))?;

    print_json(&result)
}

/// # Errors
///
/// Returns an error if the server is unreachable or has no such record.
pub(crate) async fn run_status(server: &str, request_id: &str) -> anyhow::Result<()> {
    let client = ApiClient::new(server, REQUEST_TIMEOUT)?;
    let record = client
        .ledger(request_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no ledger record for request '{request_id}'"))?;

    if record.analysis_status == StageStatus::Completed {
        if let Some(id) = record.analysis_job_id {
            eprintln!("analysis ready; run `rivalscope-cli result {id}`");
        }
    }
    print_json(&record)
}

/// # Errors
///
/// Returns an error if the server is unreachable or has no such analysis.
pub(crate) async fn run_result(server: &str, analysis_job_id: Uuid) -> anyhow::Result<()> {
    let client = ApiClient::new(server, REQUEST_TIMEOUT)?;
    let record = client.analysis(analysis_job_id).await?;
    print_json(&record)
}

/// # Errors
///
/// Returns an error if `DATABASE_URL` is unset or migrations fail.
pub(crate) async fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let pool = rivalscope_ledger::connect_pool(url, PoolConfig::from_app_config(config)).await?;
    let applied = rivalscope_ledger::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations complete");
    println!("applied {applied} migration(s)");
    Ok(())
}
