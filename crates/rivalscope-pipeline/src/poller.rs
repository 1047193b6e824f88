//! Client-side wait for a comparison: polls the ledger until analysis
//! completes, one stage fails, or the wall-clock budget runs out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rivalscope_core::{AnalysisResult, AppConfig, LedgerRecord, StageStatus};
use rivalscope_ledger::{LedgerError, Store};
use uuid::Uuid;

use crate::error::{PollError, TransportError};

/// Where the poller reads status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `Ok(None)` when the ledger has no record yet.
    async fn ledger(&self, request_id: &str) -> Result<Option<LedgerRecord>, TransportError>;

    async fn analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisResult, TransportError>;
}

/// What the poller last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Initializing,
    CollectingData,
    RunningAnalysis,
}

impl PollPhase {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            PollPhase::Initializing => "waiting for the request to be registered",
            PollPhase::CollectingData => "collecting data",
            PollPhase::RunningAnalysis => "running analysis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Total wall-clock budget, independent of how many polls fit in it.
    pub timeout: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
            max_consecutive_errors: 3,
        }
    }
}

impl PollerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.poll_timeout_secs),
            ..Self::default()
        }
    }
}

enum Observation {
    Phase(PollPhase),
    Done(AnalysisResult),
}

pub struct StatusPoller<S> {
    source: S,
    config: PollerConfig,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        Self { source, config }
    }

    /// Polls until a terminal outcome. `on_progress` fires on every phase change.
    ///
    /// # Errors
    ///
    /// - [`PollError::CollectionFailed`] / [`PollError::AnalysisFailed`] with the
    ///   ledger's diagnostic.
    /// - [`PollError::Timeout`] when the budget elapses first.
    /// - [`PollError::Transport`] after more than `max_consecutive_errors`
    ///   reads in a row fail.
    pub async fn wait_for_result(
        &self,
        request_id: &str,
        mut on_progress: impl FnMut(PollPhase) + Send,
    ) -> Result<AnalysisResult, PollError> {
        let timeout = self.config.timeout;
        let polling = async {
            let mut last_phase = None;
            let mut consecutive_errors = 0u32;
            loop {
                match self.observe(request_id).await {
                    Ok(Observation::Done(result)) => return Ok(result),
                    Ok(Observation::Phase(phase)) => {
                        consecutive_errors = 0;
                        if last_phase != Some(phase) {
                            tracing::debug!(request_id, ?phase, "poll phase changed");
                            on_progress(phase);
                            last_phase = Some(phase);
                        }
                    }
                    Err(Failure::Terminal(e)) => return Err(e),
                    Err(Failure::Transport(e)) => {
                        consecutive_errors += 1;
                        tracing::warn!(
                            request_id,
                            consecutive_errors,
                            error = %e,
                            "status read failed"
                        );
                        if consecutive_errors > self.config.max_consecutive_errors {
                            return Err(PollError::Transport {
                                attempts: consecutive_errors,
                                last: e.to_string(),
                            });
                        }
                    }
                }
                tokio::time::sleep(self.config.interval).await;
            }
        };

        match tokio::time::timeout(timeout, polling).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PollError::Timeout { waited: timeout }),
        }
    }

    async fn observe(&self, request_id: &str) -> Result<Observation, Failure> {
        let Some(record) = self.source.ledger(request_id).await? else {
            return Ok(Observation::Phase(PollPhase::Initializing));
        };

        match record.data_collection_status {
            StageStatus::Failed => {
                return Err(Failure::Terminal(PollError::CollectionFailed(
                    record
                        .collection_error
                        .unwrap_or_else(|| "no reason recorded".to_string()),
                )));
            }
            StageStatus::Pending | StageStatus::Running => {
                return Ok(Observation::Phase(PollPhase::CollectingData));
            }
            StageStatus::Completed => {}
        }

        match (record.analysis_status, record.analysis_job_id) {
            (StageStatus::Failed, _) => Err(Failure::Terminal(PollError::AnalysisFailed(
                record
                    .analysis_error
                    .unwrap_or_else(|| "no reason recorded".to_string()),
            ))),
            (StageStatus::Completed, Some(id)) => {
                Ok(Observation::Done(self.source.analysis(id).await?))
            }
            _ => Ok(Observation::Phase(PollPhase::RunningAnalysis)),
        }
    }
}

enum Failure {
    Terminal(PollError),
    Transport(TransportError),
}

impl From<TransportError> for Failure {
    fn from(e: TransportError) -> Self {
        Failure::Transport(e)
    }
}

/// Reads status straight from a store, for in-process callers.
#[derive(Clone)]
pub struct StoreStatusSource {
    store: Arc<dyn Store>,
}

impl StoreStatusSource {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StatusSource for StoreStatusSource {
    async fn ledger(&self, request_id: &str) -> Result<Option<LedgerRecord>, TransportError> {
        match self.store.get(request_id).await {
            Ok(record) => Ok(Some(record)),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(TransportError(e.to_string())),
        }
    }

    async fn analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisResult, TransportError> {
        let record = self
            .store
            .load_analysis(analysis_job_id)
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        record.result.ok_or_else(|| {
            TransportError(format!("analysis {analysis_job_id} has no stored result"))
        })
    }
}
