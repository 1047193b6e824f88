//! Per-source collection outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::SourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Live data from the external source.
    Ok,
    /// A cached or synthetic value was substituted.
    Degraded,
    /// Not even a fallback value could be produced.
    Failed,
}

impl SourceStatus {
    /// `Ok` and `Degraded` results both count towards a subject's usable data.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, SourceStatus::Ok | SourceStatus::Degraded)
    }
}

/// Kind-specific metrics collected from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourcePayload {
    News {
        /// Mean lexicon score in `[-1.0, 1.0]`.
        sentiment: f64,
        article_count: u32,
        headlines: Vec<String>,
    },
    SocialMedia {
        sentiment: f64,
        mention_count: u32,
        engagement: u64,
    },
    EmployerReviews {
        /// Average rating on a 1–5 scale.
        rating: f64,
        review_count: u32,
        recommend_pct: f64,
    },
    WebsiteQuality {
        /// Composite 0–100 score.
        quality_score: f64,
        response_ms: u64,
        https: bool,
        page_bytes: u64,
        has_title: bool,
        has_meta_description: bool,
        has_viewport: bool,
    },
}

impl SourcePayload {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            SourcePayload::News { .. } => SourceKind::News,
            SourcePayload::SocialMedia { .. } => SourceKind::SocialMedia,
            SourcePayload::EmployerReviews { .. } => SourceKind::EmployerReviews,
            SourcePayload::WebsiteQuality { .. } => SourceKind::WebsiteQuality,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub payload: Option<SourcePayload>,
    pub fetched_at: DateTime<Utc>,
    pub used_fallback: bool,
    /// Diagnostic for degraded or failed results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    #[must_use]
    pub fn ok(payload: SourcePayload) -> Self {
        Self {
            kind: payload.kind(),
            status: SourceStatus::Ok,
            payload: Some(payload),
            fetched_at: Utc::now(),
            used_fallback: false,
            error: None,
        }
    }

    #[must_use]
    pub fn degraded(payload: SourcePayload, error: impl Into<String>) -> Self {
        Self {
            kind: payload.kind(),
            status: SourceStatus::Degraded,
            payload: Some(payload),
            fetched_at: Utc::now(),
            used_fallback: true,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn failed(kind: SourceKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            status: SourceStatus::Failed,
            payload: None,
            fetched_at: Utc::now(),
            used_fallback: false,
            error: Some(error.into()),
        }
    }
}
