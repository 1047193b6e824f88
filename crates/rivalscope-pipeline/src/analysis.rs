//! Analysis handoff: claims ready ledger records and runs the scoring step.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rivalscope_core::{
    AnalysisRecord, AnalysisResult, CollectionJob, CoreError, JobStatus, LedgerPatch,
    LedgerRecord, StageStatus,
};
use rivalscope_ledger::{LedgerError, Store};
use uuid::Uuid;

use crate::coordinator::CompletionHook;
use crate::error::{AnalysisError, PipelineError};
use crate::retry::retry_store_write;
use crate::scoring::analyze;

/// Runs analysis for requests whose data collection completed.
///
/// Safe to run from several processes at once: a record is claimed by writing
/// the analysis job id, which the ledger accepts exactly once.
#[derive(Clone)]
pub struct AnalysisHandoff {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for AnalysisHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisHandoff").finish_non_exhaustive()
    }
}

impl AnalysisHandoff {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Analyses one request if it is ready and unclaimed.
    ///
    /// Returns the new analysis job id, or `None` when the record was not
    /// ready or another worker claimed it first. A computation failure is not
    /// an error here: it is stored as a failed analysis and written to the
    /// ledger as `Failed`.
    ///
    /// Once a record is claimed its analysis always ends `Completed` or
    /// `Failed` in the ledger unless the ledger itself stays unreachable: a
    /// result that cannot be stored is recorded as a failed analysis.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Store`] when the ledger or result store is unreachable.
    pub async fn run(&self, request_id: &str) -> Result<Option<Uuid>, PipelineError> {
        let record = self.store.get(request_id).await?;
        if !record.ready_for_analysis() {
            tracing::debug!(
                request_id,
                collection = %record.data_collection_status,
                analysis = %record.analysis_status,
                "not ready for analysis"
            );
            return Ok(None);
        }

        let analysis_job_id = Uuid::new_v4();
        let started_at = Utc::now();
        if !self.claim(request_id, analysis_job_id).await? {
            return Ok(None);
        }
        tracing::info!(request_id, %analysis_job_id, "analysis claimed");

        let outcome = match self.load_snapshot(&record).await {
            Ok(job) => analyze(analysis_job_id, &job),
            Err(e) => Err(e),
        };
        self.finish(request_id, analysis_job_id, started_at, outcome)
            .await?;
        Ok(Some(analysis_job_id))
    }

    /// Scans up to `limit` ready records and runs each. Individual failures
    /// are logged and skipped. Returns the analysis job ids that were started.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Store`] when the ready list cannot be read.
    pub async fn poll_once(&self, limit: usize) -> Result<Vec<Uuid>, PipelineError> {
        let ready = self.store.list_ready_for_analysis(limit).await?;
        let mut started = Vec::new();
        for record in ready {
            match self.run(&record.request_id).await {
                Ok(Some(id)) => started.push(id),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    request_id = %record.request_id,
                    error = %e,
                    "analysis run failed"
                ),
            }
        }
        if !started.is_empty() {
            tracing::info!(count = started.len(), "analysis poll processed records");
        }
        Ok(started)
    }

    /// Attempts the write-once claim. `false` means another worker won.
    async fn claim(&self, request_id: &str, analysis_job_id: Uuid) -> Result<bool, PipelineError> {
        match self
            .store
            .update(request_id, &LedgerPatch::analysis_started(analysis_job_id))
            .await
        {
            // A terminal analysis stage ignores the patch, so confirm the id stuck.
            Ok(record) => Ok(claimed_by(&record, analysis_job_id)),
            Err(LedgerError::Rejected(
                CoreError::JobIdConflict { .. } | CoreError::InvalidTransition { .. },
            )) => {
                tracing::debug!(request_id, "analysis already claimed elsewhere");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_snapshot(&self, record: &LedgerRecord) -> Result<CollectionJob, AnalysisError> {
        let job_id = record
            .data_collection_job_id
            .ok_or_else(|| AnalysisError::MissingJobId(record.request_id.clone()))?;
        self.store
            .load_job(job_id)
            .await
            .map_err(|e| AnalysisError::SnapshotUnavailable(e.to_string()))
    }

    async fn finish(
        &self,
        request_id: &str,
        analysis_job_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> Result<(), PipelineError> {
        let (record, patch) = match outcome {
            Ok(result) => (
                AnalysisRecord::completed(result, started_at),
                LedgerPatch::analysis_finished(StageStatus::Completed, None),
            ),
            Err(e) => {
                tracing::warn!(request_id, %analysis_job_id, error = %e, "analysis failed");
                let reason = e.to_string();
                (
                    AnalysisRecord::failed(analysis_job_id, request_id, reason.clone(), started_at),
                    LedgerPatch::analysis_finished(StageStatus::Failed, Some(reason)),
                )
            }
        };

        let store = &self.store;
        let (patch, save_error) =
            match retry_store_write("analysis record", || store.save_analysis(&record)).await {
                Ok(()) => (patch, None),
                Err(e) => {
                    tracing::error!(
                        request_id,
                        %analysis_job_id,
                        error = %e,
                        "failed to store analysis record"
                    );
                    let reason = format!("analysis record could not be stored: {e}");
                    (
                        LedgerPatch::analysis_finished(StageStatus::Failed, Some(reason)),
                        Some(e),
                    )
                }
            };

        if let Err(e) = retry_store_write("ledger", || store.update(request_id, &patch)).await {
            tracing::error!(
                request_id,
                %analysis_job_id,
                error = %e,
                "failed to record analysis outcome in ledger"
            );
            return Err(e.into());
        }
        if let Some(e) = save_error {
            return Err(e.into());
        }
        tracing::info!(request_id, %analysis_job_id, status = %record.status, "analysis finished");
        Ok(())
    }
}

fn claimed_by(record: &LedgerRecord, analysis_job_id: Uuid) -> bool {
    record.analysis_job_id == Some(analysis_job_id)
        && record.analysis_status == StageStatus::Running
}

#[async_trait]
impl CompletionHook for AnalysisHandoff {
    async fn on_collection_finished(&self, job: &CollectionJob) {
        if job.status != JobStatus::Completed {
            return;
        }
        if let Err(e) = self.run(&job.request_id).await {
            tracing::error!(
                request_id = %job.request_id,
                error = %e,
                "triggered analysis could not run"
            );
        }
    }
}
