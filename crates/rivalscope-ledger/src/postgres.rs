//! Postgres-backed store.
//!
//! Ledger updates run inside a transaction that locks the row with
//! `SELECT ... FOR UPDATE`, applies [`LedgerRecord::apply`] in Rust and writes
//! the merged row back, so concurrent writers from either stage serialise per
//! request id. Snapshots are stored as `JSONB`.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rivalscope_core::{AnalysisRecord, CollectionJob, LedgerPatch, LedgerRecord, StageStatus};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{Ledger, ResultStore};
use crate::LedgerError;

const LEDGER_COLUMNS: &str = "request_id, data_collection_job_id, data_collection_status, \
     collection_error, analysis_job_id, analysis_status, analysis_error, created_at, last_updated";

/// A row from the `ledger_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    pub request_id: String,
    pub data_collection_job_id: Option<Uuid>,
    pub data_collection_status: String,
    pub collection_error: Option<String>,
    pub analysis_job_id: Option<Uuid>,
    pub analysis_status: String,
    pub analysis_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerRecord {
    type Error = LedgerError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            raw.parse::<StageStatus>()
                .map_err(|reason| LedgerError::Corrupt {
                    what: "ledger status",
                    reason,
                })
        };
        Ok(LedgerRecord {
            data_collection_status: parse(&row.data_collection_status)?,
            analysis_status: parse(&row.analysis_status)?,
            request_id: row.request_id,
            data_collection_job_id: row.data_collection_job_id,
            collection_error: row.collection_error,
            analysis_job_id: row.analysis_job_id,
            analysis_error: row.analysis_error,
            created_at: row.created_at,
            last_updated: row.last_updated,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn create(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "INSERT INTO ledger_records (request_id) VALUES ($1) \
             ON CONFLICT (request_id) DO NOTHING \
             RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(LedgerError::AlreadyExists(request_id.to_owned())),
        }
    }

    async fn update(
        &self,
        request_id: &str,
        patch: &LedgerPatch,
    ) -> Result<LedgerRecord, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_records WHERE request_id = $1 FOR UPDATE"
        ))
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(request_id.to_owned()))?;

        let mut record = LedgerRecord::try_from(row)?;
        // TIMESTAMPTZ keeps microseconds.
        if !record.apply(patch, Utc::now().trunc_subsecs(6))? {
            tx.rollback().await?;
            return Ok(record);
        }

        sqlx::query(
            "UPDATE ledger_records SET \
                 data_collection_job_id = $2, data_collection_status = $3, collection_error = $4, \
                 analysis_job_id = $5, analysis_status = $6, analysis_error = $7, \
                 last_updated = $8 \
             WHERE request_id = $1",
        )
        .bind(&record.request_id)
        .bind(record.data_collection_job_id)
        .bind(record.data_collection_status.as_str())
        .bind(record.collection_error.as_deref())
        .bind(record.analysis_job_id)
        .bind(record.analysis_status.as_str())
        .bind(record.analysis_error.as_deref())
        .bind(record.last_updated)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_records WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(request_id.to_owned()))?
        .try_into()
    }

    async fn list_ready_for_analysis(
        &self,
        limit: usize,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_records \
             WHERE data_collection_status = 'completed' AND analysis_status = 'pending' \
             ORDER BY created_at, request_id \
             LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        crate::health_check(&self.pool).await
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn save_job(&self, job: &CollectionJob) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO collection_jobs (job_id, request_id, status, snapshot, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (job_id) DO UPDATE \
             SET status = EXCLUDED.status, snapshot = EXCLUDED.snapshot, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(job.job_id)
        .bind(&job.request_id)
        .bind(job.status.as_str())
        .bind(Json(job))
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<CollectionJob, LedgerError> {
        let snapshot = sqlx::query_scalar::<_, Json<CollectionJob>>(
            "SELECT snapshot FROM collection_jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::JobNotFound(job_id))?;
        Ok(snapshot.0)
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO analysis_records (analysis_job_id, request_id, status, record, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (analysis_job_id) DO UPDATE \
             SET status = EXCLUDED.status, record = EXCLUDED.record, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(record.analysis_job_id)
        .bind(&record.request_id)
        .bind(record.status.as_str())
        .bind(Json(record))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisRecord, LedgerError> {
        let record = sqlx::query_scalar::<_, Json<AnalysisRecord>>(
            "SELECT record FROM analysis_records WHERE analysis_job_id = $1",
        )
        .bind(analysis_job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::AnalysisNotFound(analysis_job_id))?;
        Ok(record.0)
    }
}
