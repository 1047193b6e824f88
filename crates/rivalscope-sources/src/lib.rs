//! Source collectors for brand and competitor signals.
//!
//! Each [`SourceKind`](rivalscope_core::SourceKind) has one HTTP fetcher
//! (news RSS, Reddit search, employer reviews, website probe). A
//! [`SourceCollector`] wraps a fetcher with a per-call timeout, retry with
//! back-off, a private rate limiter, and a cached-or-synthetic fallback, so
//! collecting a source always yields a [`SourceResult`](rivalscope_core::SourceResult).

pub mod collector;
pub mod error;
pub mod fallback;
pub mod rate_limit;
pub mod scorer;
pub mod sources;

mod retry;

pub use collector::{CollectorPolicy, CollectorRegistry, SourceCollector, SourceFetcher};
pub use error::SourceError;
pub use fallback::synthetic_payload;
pub use rate_limit::RateLimiter;
pub use scorer::lexicon_score;
pub use sources::{build_http_client, NewsFetcher, ReviewsFetcher, SocialFetcher, WebsiteFetcher};
