//! Collection and analysis stages, and the client-side status poller.
//!
//! The two stages share nothing but the ledger: the [`Coordinator`] writes the
//! collection status and snapshot, the [`AnalysisHandoff`] picks up records
//! whose collection completed, either when the coordinator's completion hook
//! fires or from a periodic [`AnalysisHandoff::poll_once`] sweep.

pub mod analysis;
pub mod coordinator;
pub mod error;
pub mod poller;
mod retry;
pub mod scoring;

pub use analysis::AnalysisHandoff;
pub use coordinator::{CompletionHook, Coordinator, StartedJob};
pub use error::{AnalysisError, PipelineError, PollError, TransportError};
pub use poller::{PollPhase, PollerConfig, StatusPoller, StatusSource, StoreStatusSource};
