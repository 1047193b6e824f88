//! The cross-stage ledger record and its merge rules.
//!
//! Both stages write to the same record but own disjoint fields: the
//! coordinator owns the `data_collection_*` fields and the analysis stage owns
//! the `analysis_*` fields. [`LedgerRecord::apply`] is the single place the
//! transition rules live, so every storage backend enforces them identically.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            StageStatus::Pending => 0,
            StageStatus::Running => 1,
            StageStatus::Completed | StageStatus::Failed => 2,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            other => Err(format!("unknown stage status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DataCollection,
    Analysis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::DataCollection => f.write_str("data collection"),
            Stage::Analysis => f.write_str("analysis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub request_id: String,
    pub data_collection_job_id: Option<Uuid>,
    pub data_collection_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_error: Option<String>,
    pub analysis_job_id: Option<Uuid>,
    pub analysis_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPatch {
    pub data_collection_job_id: Option<Uuid>,
    pub data_collection_status: Option<StageStatus>,
    pub collection_error: Option<String>,
    pub analysis_job_id: Option<Uuid>,
    pub analysis_status: Option<StageStatus>,
    pub analysis_error: Option<String>,
}

impl LedgerPatch {
    #[must_use]
    pub fn collection_started(job_id: Uuid) -> Self {
        Self {
            data_collection_job_id: Some(job_id),
            data_collection_status: Some(StageStatus::Running),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn collection_finished(status: StageStatus, error: Option<String>) -> Self {
        Self {
            data_collection_status: Some(status),
            collection_error: error,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn analysis_started(job_id: Uuid) -> Self {
        Self {
            analysis_job_id: Some(job_id),
            analysis_status: Some(StageStatus::Running),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn analysis_finished(status: StageStatus, error: Option<String>) -> Self {
        Self {
            analysis_status: Some(status),
            analysis_error: error,
            ..Self::default()
        }
    }
}

struct StageFields<'a> {
    status: &'a mut StageStatus,
    job_id: &'a mut Option<Uuid>,
    error: &'a mut Option<String>,
}

impl LedgerRecord {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            data_collection_job_id: None,
            data_collection_status: StageStatus::Pending,
            collection_error: None,
            analysis_job_id: None,
            analysis_status: StageStatus::Pending,
            analysis_error: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// True when collection finished successfully and nobody claimed analysis yet.
    #[must_use]
    pub fn ready_for_analysis(&self) -> bool {
        self.data_collection_status == StageStatus::Completed
            && self.analysis_status == StageStatus::Pending
    }

    /// Merges `patch` into the record.
    ///
    /// Fields belonging to a stage that already reached a terminal status are
    /// ignored, so replaying a terminal update is a no-op. Either every field
    /// of the patch is applied or none is. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidTransition`] when a status would move backwards.
    /// - [`CoreError::OrderingViolation`] when analysis would leave `Pending`
    ///   before data collection is `Completed`.
    /// - [`CoreError::JobIdConflict`] when a stage job id is already set to a
    ///   different value.
    pub fn apply(&mut self, patch: &LedgerPatch, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let mut next = self.clone();
        let mut changed = false;

        if !self.data_collection_status.is_terminal() {
            changed |= apply_stage(
                Stage::DataCollection,
                StageFields {
                    status: &mut next.data_collection_status,
                    job_id: &mut next.data_collection_job_id,
                    error: &mut next.collection_error,
                },
                patch.data_collection_status,
                patch.data_collection_job_id,
                patch.collection_error.as_deref(),
            )?;
        }

        if !self.analysis_status.is_terminal() {
            if let Some(to) = patch.analysis_status {
                if to != StageStatus::Pending
                    && next.data_collection_status != StageStatus::Completed
                {
                    return Err(CoreError::OrderingViolation {
                        collection: next.data_collection_status,
                    });
                }
            }
            changed |= apply_stage(
                Stage::Analysis,
                StageFields {
                    status: &mut next.analysis_status,
                    job_id: &mut next.analysis_job_id,
                    error: &mut next.analysis_error,
                },
                patch.analysis_status,
                patch.analysis_job_id,
                patch.analysis_error.as_deref(),
            )?;
        }

        if changed {
            next.last_updated = now;
            *self = next;
        }
        Ok(changed)
    }
}

fn apply_stage(
    stage: Stage,
    fields: StageFields<'_>,
    status: Option<StageStatus>,
    job_id: Option<Uuid>,
    error: Option<&str>,
) -> Result<bool, CoreError> {
    let mut changed = false;

    if let Some(proposed) = job_id {
        match *fields.job_id {
            Some(existing) if existing != proposed => {
                return Err(CoreError::JobIdConflict {
                    stage,
                    existing,
                    proposed,
                });
            }
            Some(_) => {}
            None => {
                *fields.job_id = Some(proposed);
                changed = true;
            }
        }
    }

    if let Some(to) = status {
        let from = *fields.status;
        if to.rank() < from.rank() {
            return Err(CoreError::InvalidTransition { stage, from, to });
        }
        if to != from {
            *fields.status = to;
            changed = true;
        }
    }

    if let Some(message) = error {
        if fields.error.as_deref() != Some(message) {
            *fields.error = Some(message.to_string());
            changed = true;
        }
    }

    Ok(changed)
}
