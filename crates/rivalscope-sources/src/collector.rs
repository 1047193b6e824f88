//! Source collectors: one external fetcher wrapped in a timeout, a retry
//! budget, a private rate limiter and a fallback.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rivalscope_core::{validate_subject_id, AppConfig, SourceKind, SourcePayload, SourceResult};

use crate::error::SourceError;
use crate::fallback::{synthetic_payload, FallbackCache};
use crate::rate_limit::RateLimiter;
use crate::retry::{backoff_delay_ms, retry_with_backoff};
use crate::sources::{build_http_client, NewsFetcher, ReviewsFetcher, SocialFetcher, WebsiteFetcher};

/// Retries past this one sleep the capped back-off.
const BACKOFF_GROWTH_RETRIES: u32 = 17;

/// The raw call to one external data source.
///
/// Implementations only fetch and parse. Timeouts, retries, rate limiting and
/// fallbacks are applied around them by [`SourceCollector`].
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, subject_id: &str, area_id: &str) -> Result<SourcePayload, SourceError>;
}

/// Timeout, retry and spacing settings for one collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorPolicy {
    /// Hard limit for a single fetch attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Minimum spacing between calls to the upstream.
    pub min_interval: Duration,
    pub burst: u32,
}

impl Default for CollectorPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff_base_ms: 500,
            min_interval: Duration::from_secs(1),
            burst: 2,
        }
    }
}

impl CollectorPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.source_timeout_secs),
            max_retries: config.source_max_retries,
            backoff_base_ms: config.source_backoff_base_ms,
            min_interval: Duration::from_millis(config.source_min_interval_ms),
            ..Self::default()
        }
    }

    /// Upper bound on one `collect` call ignoring rate-limit queueing:
    /// every attempt times out and every back-off sleeps its jittered maximum.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let jittered = |attempt| backoff_delay_ms(self.backoff_base_ms, attempt) * 5 / 4;
        // Back-off stops growing after this retry, so later ones all cost the same.
        let growing = self.max_retries.min(BACKOFF_GROWTH_RETRIES);
        let backoff_ms = (1..=growing)
            .map(jittered)
            .fold(0u64, u64::saturating_add)
            .saturating_add(
                u64::from(self.max_retries - growing)
                    .saturating_mul(jittered(BACKOFF_GROWTH_RETRIES)),
            );
        let attempts = self.max_retries.saturating_add(1);
        self.timeout
            .checked_mul(attempts)
            .unwrap_or(Duration::MAX)
            .saturating_add(Duration::from_millis(backoff_ms))
    }
}

/// A fetcher plus its collection policy. `collect` never returns an error.
pub struct SourceCollector {
    fetcher: Arc<dyn SourceFetcher>,
    policy: CollectorPolicy,
    limiter: RateLimiter,
    cache: FallbackCache,
}

impl std::fmt::Debug for SourceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCollector")
            .field("kind", &self.fetcher.kind())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SourceCollector {
    #[must_use]
    pub fn new(fetcher: Arc<dyn SourceFetcher>, policy: CollectorPolicy) -> Self {
        Self {
            fetcher,
            limiter: RateLimiter::new(policy.min_interval, policy.burst),
            policy,
            cache: FallbackCache::default(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.fetcher.kind()
    }

    #[must_use]
    pub fn policy(&self) -> CollectorPolicy {
        self.policy
    }

    /// Collects one source for one subject.
    ///
    /// Returns `Ok` with live data, `Degraded` with a cached or synthetic
    /// payload once the retry budget is spent (or on a non-retriable error),
    /// and `Failed` only for a malformed subject id.
    pub async fn collect(&self, subject_id: &str, area_id: &str) -> SourceResult {
        let kind = self.kind();

        if let Err(e) = validate_subject_id(subject_id) {
            tracing::warn!(source = %kind, subject = subject_id, error = %e, "rejecting subject");
            return SourceResult::failed(kind, e.to_string());
        }

        let outcome = retry_with_backoff(self.policy.max_retries, self.policy.backoff_base_ms, || {
            self.attempt(subject_id, area_id)
        })
        .await;

        match outcome {
            Ok(payload) => {
                tracing::debug!(source = %kind, subject = subject_id, "live fetch succeeded");
                self.cache.store(subject_id, area_id, &payload);
                SourceResult::ok(payload)
            }
            Err(e) => {
                let (payload, origin) = match self.cache.get(kind, subject_id, area_id) {
                    Some(cached) => (cached, "cached"),
                    None => (synthetic_payload(kind, subject_id, area_id), "synthetic"),
                };
                tracing::warn!(
                    source = %kind,
                    subject = subject_id,
                    error = %e,
                    fallback = origin,
                    "source unavailable, substituting fallback"
                );
                SourceResult::degraded(payload, format!("{e} ({origin} fallback)"))
            }
        }
    }

    async fn attempt(&self, subject_id: &str, area_id: &str) -> Result<SourcePayload, SourceError> {
        let kind = self.kind();
        self.limiter.acquire().await;

        let call = AssertUnwindSafe(self.fetcher.fetch(subject_id, area_id)).catch_unwind();
        let payload = match tokio::time::timeout(self.policy.timeout, call).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(SourceError::Internal(format!("{kind} fetcher panicked"))),
            Err(_) => {
                return Err(SourceError::Timeout {
                    kind,
                    secs: self.policy.timeout.as_secs(),
                })
            }
        };

        if payload.kind() != kind {
            return Err(SourceError::Internal(format!(
                "{kind} fetcher returned a {} payload",
                payload.kind()
            )));
        }
        Ok(payload)
    }
}

/// Collectors keyed by [`SourceKind`], one instance per kind.
#[derive(Debug, Default)]
pub struct CollectorRegistry {
    collectors: HashMap<SourceKind, Arc<SourceCollector>>,
}

impl CollectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the four HTTP-backed collectors from application config.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, SourceError> {
        let client = build_http_client(config.source_timeout_secs, &config.source_user_agent)?;
        let policy = CollectorPolicy::from_app_config(config);

        let mut registry = Self::new();
        registry.register(
            Arc::new(NewsFetcher::new(client.clone(), &config.news_base_url)),
            policy,
        );
        registry.register(
            Arc::new(SocialFetcher::new(client.clone(), &config.social_base_url)),
            policy,
        );
        registry.register(
            Arc::new(ReviewsFetcher::new(client.clone(), &config.reviews_base_url)),
            policy,
        );
        registry.register(
            Arc::new(WebsiteFetcher::new(client, &config.website_url_template)),
            policy,
        );
        Ok(registry)
    }

    /// Registers (or replaces) the collector for `fetcher.kind()`.
    pub fn register(&mut self, fetcher: Arc<dyn SourceFetcher>, policy: CollectorPolicy) {
        let kind = fetcher.kind();
        self.collectors
            .insert(kind, Arc::new(SourceCollector::new(fetcher, policy)));
    }

    #[must_use]
    pub fn get(&self, kind: SourceKind) -> Option<Arc<SourceCollector>> {
        self.collectors.get(&kind).cloned()
    }

    #[must_use]
    pub fn contains(&self, kind: SourceKind) -> bool {
        self.collectors.contains_key(&kind)
    }

    /// Worst-case duration for a job touching `kinds`; collectors run
    /// concurrently so this is the slowest single collector.
    #[must_use]
    pub fn worst_case(&self, kinds: impl IntoIterator<Item = SourceKind>) -> Duration {
        kinds
            .into_iter()
            .filter_map(|k| self.collectors.get(&k))
            .map(|c| c.policy.worst_case())
            .max()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rivalscope_core::SourceStatus;

    fn fast_policy() -> CollectorPolicy {
        CollectorPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 2,
            backoff_base_ms: 0,
            min_interval: Duration::ZERO,
            burst: 1,
        }
    }

    fn news_payload(sentiment: f64) -> SourcePayload {
        SourcePayload::News {
            sentiment,
            article_count: 4,
            headlines: vec!["Acme launches".to_string()],
        }
    }

    /// Fails the first `failures` calls with a retriable error.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl SourceFetcher for Flaky {
        fn kind(&self) -> SourceKind {
            SourceKind::News
        }

        async fn fetch(&self, _subject: &str, _area: &str) -> Result<SourcePayload, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(SourceError::UnexpectedStatus {
                    status: 503,
                    url: "http://news.test".to_string(),
                })
            } else {
                Ok(news_payload(0.4))
            }
        }
    }

    struct Hanging;

    #[async_trait]
    impl SourceFetcher for Hanging {
        fn kind(&self) -> SourceKind {
            SourceKind::WebsiteQuality
        }

        async fn fetch(&self, _subject: &str, _area: &str) -> Result<SourcePayload, SourceError> {
            std::future::pending().await
        }
    }

    struct Panicking;

    #[async_trait]
    impl SourceFetcher for Panicking {
        fn kind(&self) -> SourceKind {
            SourceKind::SocialMedia
        }

        async fn fetch(&self, _subject: &str, _area: &str) -> Result<SourcePayload, SourceError> {
            panic!("parser bug")
        }
    }

    #[tokio::test]
    async fn live_success_is_ok() {
        let fetcher = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 0,
        });
        let collector = SourceCollector::new(fetcher, fast_policy());
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Ok);
        assert!(!result.used_fallback);
        assert_eq!(result.payload, Some(news_payload(0.4)));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fetcher = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 2,
        });
        let collector = SourceCollector::new(Arc::clone(&fetcher) as Arc<dyn SourceFetcher>, fast_policy());
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Ok);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_degrades_to_synthetic() {
        let fetcher = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        });
        let collector = SourceCollector::new(Arc::clone(&fetcher) as Arc<dyn SourceFetcher>, fast_policy());
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Degraded);
        assert!(result.used_fallback);
        assert_eq!(
            result.payload,
            Some(synthetic_payload(SourceKind::News, "acme", "us"))
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn degraded_prefers_last_known_good() {
        let fetcher = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 0,
        });
        let collector = SourceCollector::new(Arc::clone(&fetcher) as Arc<dyn SourceFetcher>, fast_policy());
        assert_eq!(collector.collect("acme", "us").await.status, SourceStatus::Ok);

        let broken = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        });
        // Same cache, new upstream behaviour.
        let collector = SourceCollector {
            fetcher: broken,
            ..collector
        };
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Degraded);
        assert_eq!(result.payload, Some(news_payload(0.4)));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_upstream_times_out_and_degrades() {
        let collector = SourceCollector::new(Arc::new(Hanging), fast_policy());
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Degraded);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_fetcher_degrades() {
        let collector = SourceCollector::new(Arc::new(Panicking), fast_policy());
        let result = collector.collect("acme", "us").await;
        assert_eq!(result.status, SourceStatus::Degraded);
        assert!(result.used_fallback);
    }

    #[tokio::test]
    async fn malformed_subject_fails_without_calling_upstream() {
        let fetcher = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 0,
        });
        let collector = SourceCollector::new(Arc::clone(&fetcher) as Arc<dyn SourceFetcher>, fast_policy());
        let result = collector.collect("acme corp/../", "us").await;
        assert_eq!(result.status, SourceStatus::Failed);
        assert!(result.payload.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn worst_case_covers_every_attempt() {
        let policy = CollectorPolicy {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff_base_ms: 1000,
            min_interval: Duration::ZERO,
            burst: 1,
        };
        // 3 × 10 s timeouts + (1 s + 2 s) × 1.25 back-off.
        assert_eq!(policy.worst_case(), Duration::from_millis(33_750));
    }

    #[test]
    fn worst_case_counts_capped_back_off_for_long_retry_budgets() {
        let policy = CollectorPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 20,
            backoff_base_ms: 1000,
            min_interval: Duration::ZERO,
            burst: 1,
        };
        // Retries 1..=5 sleep 1, 2, 4, 8, 16 s; 6..=20 hit the 30 s cap. All × 1.25.
        let backoff_ms = (31_000 + 15 * 30_000) * 5 / 4;
        assert_eq!(
            policy.worst_case(),
            Duration::from_secs(21) + Duration::from_millis(backoff_ms)
        );
    }

    #[test]
    fn worst_case_saturates_on_extreme_settings() {
        let policy = CollectorPolicy {
            timeout: Duration::from_secs(u64::MAX / 2),
            max_retries: u32::MAX,
            backoff_base_ms: u64::MAX,
            min_interval: Duration::ZERO,
            burst: 1,
        };
        assert_eq!(policy.worst_case(), Duration::MAX);
    }

    #[test]
    fn registry_keys_by_kind() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Hanging), fast_policy());
        assert!(registry.contains(SourceKind::WebsiteQuality));
        assert!(registry.get(SourceKind::News).is_none());
        assert_eq!(
            registry.worst_case([SourceKind::WebsiteQuality, SourceKind::News]),
            fast_policy().worst_case()
        );
    }
}
