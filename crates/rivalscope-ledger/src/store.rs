//! Storage traits shared by both backends.

use async_trait::async_trait;
use rivalscope_core::{AnalysisRecord, CollectionJob, LedgerPatch, LedgerRecord};
use uuid::Uuid;

use crate::LedgerError;

/// Per-request status record written by both stages.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Creates a fresh record with both stages `Pending`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyExists`] when the request id is taken.
    async fn create(&self, request_id: &str) -> Result<LedgerRecord, LedgerError>;

    /// Atomically merges `patch` via [`LedgerRecord::apply`] and returns the
    /// record as stored afterwards.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown request id and
    /// [`LedgerError::Rejected`] when the merge rules refuse the patch; the
    /// stored record is unchanged in both cases.
    async fn update(&self, request_id: &str, patch: &LedgerPatch)
        -> Result<LedgerRecord, LedgerError>;

    async fn get(&self, request_id: &str) -> Result<LedgerRecord, LedgerError>;

    /// Records whose collection completed and whose analysis is unclaimed,
    /// oldest first.
    async fn list_ready_for_analysis(&self, limit: usize)
        -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Cheap liveness probe for the backing store.
    async fn ping(&self) -> Result<(), LedgerError>;
}

/// Collection snapshots and analysis outcomes, keyed by their job ids.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserts or replaces the snapshot for `job.job_id`.
    async fn save_job(&self, job: &CollectionJob) -> Result<(), LedgerError>;

    async fn load_job(&self, job_id: Uuid) -> Result<CollectionJob, LedgerError>;

    /// Inserts or replaces the record for `record.analysis_job_id`.
    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), LedgerError>;

    async fn load_analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisRecord, LedgerError>;
}

/// Both halves of the storage surface, usable as one trait object.
pub trait Store: Ledger + ResultStore {}

impl<T: Ledger + ResultStore> Store for T {}
