//! The collection job aggregate owned by the coordinator.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::{ComparisonRequest, SourceKind, Subject};
use crate::source::SourceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outstanding (subject, source) collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingEntry {
    pub subject: Subject,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionJob {
    pub job_id: Uuid,
    pub request_id: String,
    pub brand_id: String,
    pub competitor_id: String,
    pub area_id: String,
    pub sources: BTreeSet<SourceKind>,
    pub pending: BTreeSet<PendingEntry>,
    pub results: BTreeMap<Subject, BTreeMap<SourceKind, SourceResult>>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing progress view over a [`CollectionJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub completed_sources: Vec<String>,
    pub remaining_sources: Vec<String>,
}

impl CollectionJob {
    /// Creates a running job with `pending = sources × {brand, competitor}`.
    #[must_use]
    pub fn new(job_id: Uuid, request: &ComparisonRequest) -> Self {
        let pending = Subject::BOTH
            .into_iter()
            .flat_map(|subject| {
                request
                    .sources
                    .iter()
                    .map(move |&kind| PendingEntry { subject, kind })
            })
            .collect();
        let now = Utc::now();
        Self {
            job_id,
            request_id: request.request_id.clone(),
            brand_id: request.brand_id.clone(),
            competitor_id: request.competitor_id.clone(),
            area_id: request.area_id.clone(),
            sources: request.sources.clone(),
            pending,
            results: BTreeMap::new(),
            status: JobStatus::Running,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn subject_id(&self, subject: Subject) -> &str {
        match subject {
            Subject::Brand => &self.brand_id,
            Subject::Competitor => &self.competitor_id,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.sources.len() * Subject::BOTH.len()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.results.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn result(&self, subject: Subject, kind: SourceKind) -> Option<&SourceResult> {
        self.results.get(&subject).and_then(|m| m.get(&kind))
    }

    /// Number of `Ok`/`Degraded` results collected for `subject`.
    #[must_use]
    pub fn usable_count(&self, subject: Subject) -> usize {
        self.results.get(&subject).map_or(0, |m| {
            m.values().filter(|r| r.status.is_usable()).count()
        })
    }

    /// Records one collector completion.
    ///
    /// Removes the pending entry, stores the result and re-evaluates the job
    /// status. Returns `true` when this call moved the job to a terminal
    /// status. Results for entries that are not pending (duplicates or
    /// completions arriving after the job is terminal) are ignored.
    pub fn record(&mut self, subject: Subject, result: SourceResult) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let entry = PendingEntry {
            subject,
            kind: result.kind,
        };
        if !self.pending.remove(&entry) {
            return false;
        }
        self.results
            .entry(subject)
            .or_default()
            .insert(result.kind, result);
        self.updated_at = Utc::now();
        self.evaluate()
    }

    /// Decides the terminal status once nothing is pending.
    fn evaluate(&mut self) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        let unusable: Vec<Subject> = Subject::BOTH
            .into_iter()
            .filter(|&s| self.usable_count(s) == 0)
            .collect();
        if unusable.is_empty() {
            self.status = JobStatus::Completed;
        } else {
            let names: Vec<String> = unusable
                .iter()
                .map(|&s| format!("{s} {}", self.subject_id(s)))
                .collect();
            self.status = JobStatus::Failed;
            self.failure_reason = Some(format!(
                "every source failed for {}",
                names.join(" and ")
            ));
        }
        true
    }

    #[must_use]
    pub fn progress(&self) -> CollectionProgress {
        let total = self.total();
        let completed = self.completed();
        let percent = if total == 0 {
            100
        } else {
            u8::try_from(completed * 100 / total).unwrap_or(100)
        };
        let label = |subject: Subject, kind: SourceKind| format!("{subject}:{kind}");
        CollectionProgress {
            job_id: self.job_id,
            status: self.status,
            progress: percent,
            completed_sources: self
                .results
                .iter()
                .flat_map(|(&s, m)| m.keys().map(move |&k| label(s, k)))
                .collect(),
            remaining_sources: self.pending.iter().map(|e| label(e.subject, e.kind)).collect(),
        }
    }
}
