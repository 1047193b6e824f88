//! Shared domain types and configuration for the rivalscope workspace.
//!
//! Everything that crosses a crate boundary lives here: the comparison
//! request, per-source results, the collection job aggregate, the ledger
//! record with its transition rules, and the analysis envelope.

pub mod analysis;
pub mod app_config;
pub mod config;
pub mod job;
pub mod ledger;
pub mod request;
pub mod source;

use thiserror::Error;
use uuid::Uuid;

pub use analysis::{
    AnalysisRecord, AnalysisResult, Impact, Insight, Quarter, RoadmapItem, SubjectScores,
};
pub use app_config::{AnalysisMode, AppConfig, Environment, Stages};
pub use config::{load_app_config, load_app_config_from_env};
pub use job::{CollectionJob, CollectionProgress, JobStatus, PendingEntry};
pub use ledger::{LedgerPatch, LedgerRecord, Stage, StageStatus};
pub use request::{validate_subject_id, ComparisonRequest, SourceKind, Subject};
pub use source::{SourcePayload, SourceResult, SourceStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown source kind: {0}")]
    UnknownSource(String),

    #[error("sources must not be empty")]
    EmptySources,

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("brand and competitor must differ (both are {0})")]
    SameSubject(String),

    #[error("{stage} status cannot move from {from} to {to}")]
    InvalidTransition {
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("analysis cannot leave pending while data collection is {collection}")]
    OrderingViolation { collection: StageStatus },

    #[error("{stage} job id already set to {existing}, refusing {proposed}")]
    JobIdConflict {
        stage: Stage,
        existing: Uuid,
        proposed: Uuid,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
