use std::time::Duration;

use rivalscope_core::{CoreError, SourceKind};
use rivalscope_ledger::LedgerError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    #[error("request {0} has already been submitted")]
    DuplicateRequest(String),

    #[error("no collector registered for source {0}")]
    UnsupportedSource(SourceKind),

    #[error("collection job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] LedgerError),
}

/// Reasons a collection snapshot cannot be turned into an analysis.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("collection job {job_id} is {status}, not completed")]
    NotCompleted { job_id: Uuid, status: String },

    #[error("no usable results for {subject} {subject_id}")]
    NoUsableResults { subject: String, subject_id: String },

    #[error("{subject} slot {slot} holds a {found} result")]
    KindMismatch {
        subject: String,
        slot: SourceKind,
        found: SourceKind,
    },

    #[error("ledger record {0} has no collection job id")]
    MissingJobId(String),

    #[error("could not load collection job: {0}")]
    SnapshotUnavailable(String),
}

/// Terminal outcomes of [`crate::poller::StatusPoller::wait_for_result`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("data collection failed: {0}")]
    CollectionFailed(String),

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("gave up after waiting {}s", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("status source unreachable after {attempts} consecutive errors: {last}")]
    Transport { attempts: u32, last: String },
}

/// A failed read from a [`crate::poller::StatusSource`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);
