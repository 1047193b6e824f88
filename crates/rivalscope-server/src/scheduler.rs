//! Background job scheduler.
//!
//! In poll mode the analysis stage learns about finished collections by
//! sweeping the ledger on a cron schedule instead of through the coordinator's
//! completion hook.

use rivalscope_pipeline::AnalysisHandoff;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Ready records processed per sweep.
pub const ANALYSIS_BATCH_SIZE: usize = 25;

/// Builds and starts the scheduler with the analysis sweep registered.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the cron expression is invalid or the
/// scheduler cannot be initialised or started.
pub async fn build_scheduler(
    handoff: AnalysisHandoff,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_analysis_poll_job(&scheduler, handoff, cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_analysis_poll_job(
    scheduler: &JobScheduler,
    handoff: AnalysisHandoff,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let handoff = handoff.clone();
        Box::pin(async move {
            run_analysis_sweep(&handoff).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: analysis poll job registered");
    Ok(())
}

async fn run_analysis_sweep(handoff: &AnalysisHandoff) {
    match handoff.poll_once(ANALYSIS_BATCH_SIZE).await {
        Ok(started) if started.is_empty() => {
            tracing::trace!("scheduler: no records ready for analysis");
        }
        Ok(started) => {
            tracing::info!(count = started.len(), "scheduler: analysis sweep complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: analysis sweep failed");
        }
    }
}
