//! Analysis output envelope.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::StageStatus;
use crate::request::SourceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScores {
    pub subject_id: String,
    /// Mean of the per-source scores, 0–100.
    pub overall: f64,
    pub by_source: BTreeMap<SourceKind, f64>,
    /// Sources whose score came from fallback data.
    pub degraded_sources: Vec<SourceKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// 1-based, most significant first.
    pub rank: u32,
    pub source: SourceKind,
    pub title: String,
    pub detail: String,
    pub impact: Impact,
    /// Brand score minus competitor score.
    pub gap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapItem {
    pub quarter: Quarter,
    pub source: SourceKind,
    pub initiative: String,
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis_job_id: Uuid,
    pub request_id: String,
    pub area_id: String,
    pub brand: SubjectScores,
    pub competitor: SubjectScores,
    pub insights: Vec<Insight>,
    pub roadmap: Vec<RoadmapItem>,
    pub generated_at: DateTime<Utc>,
}

/// Stored state of one analysis run, keyed by `analysis_job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub analysis_job_id: Uuid,
    pub request_id: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    #[must_use]
    pub fn completed(result: AnalysisResult, started_at: DateTime<Utc>) -> Self {
        Self {
            analysis_job_id: result.analysis_job_id,
            request_id: result.request_id.clone(),
            status: StageStatus::Completed,
            result: Some(result),
            error: None,
            created_at: started_at,
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(
        analysis_job_id: Uuid,
        request_id: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            analysis_job_id,
            request_id: request_id.into(),
            status: StageStatus::Failed,
            result: None,
            error: Some(error.into()),
            created_at: started_at,
            updated_at: Utc::now(),
        }
    }
}
