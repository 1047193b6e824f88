//! In-process store behind a single async mutex.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rivalscope_core::{AnalysisRecord, CollectionJob, LedgerPatch, LedgerRecord};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{Ledger, ResultStore};
use crate::LedgerError;

#[derive(Debug, Default)]
struct Tables {
    ledger: HashMap<String, LedgerRecord>,
    jobs: HashMap<Uuid, CollectionJob>,
    analyses: HashMap<Uuid, AnalysisRecord>,
}

/// Single-process store. Every operation holds the lock for its whole
/// duration, so updates for one request id are serialised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn create(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        let mut tables = self.tables.lock().await;
        if tables.ledger.contains_key(request_id) {
            return Err(LedgerError::AlreadyExists(request_id.to_owned()));
        }
        let record = LedgerRecord::new(request_id);
        tables.ledger.insert(request_id.to_owned(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        request_id: &str,
        patch: &LedgerPatch,
    ) -> Result<LedgerRecord, LedgerError> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .ledger
            .get_mut(request_id)
            .ok_or_else(|| LedgerError::NotFound(request_id.to_owned()))?;
        record.apply(patch, Utc::now())?;
        Ok(record.clone())
    }

    async fn get(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        self.tables
            .lock()
            .await
            .ledger
            .get(request_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(request_id.to_owned()))
    }

    async fn list_ready_for_analysis(
        &self,
        limit: usize,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        let tables = self.tables.lock().await;
        let mut ready: Vec<LedgerRecord> = tables
            .ledger
            .values()
            .filter(|r| r.ready_for_analysis())
            .cloned()
            .collect();
        ready.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        ready.truncate(limit);
        Ok(ready)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_job(&self, job: &CollectionJob) -> Result<(), LedgerError> {
        self.tables.lock().await.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<CollectionJob, LedgerError> {
        self.tables
            .lock()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(LedgerError::JobNotFound(job_id))
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), LedgerError> {
        self.tables
            .lock()
            .await
            .analyses
            .insert(record.analysis_job_id, record.clone());
        Ok(())
    }

    async fn load_analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisRecord, LedgerError> {
        self.tables
            .lock()
            .await
            .analyses
            .get(&analysis_job_id)
            .cloned()
            .ok_or(LedgerError::AnalysisNotFound(analysis_job_id))
    }
}
