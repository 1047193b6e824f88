//! Retry with exponential back-off and jitter for source fetches.
//!
//! [`retry_with_backoff`] wraps one fetch attempt and retries it on transient
//! errors (network failures, timeouts, 429, 5xx). Everything else is returned
//! immediately so the collector can fall back without burning its budget.

use std::future::Future;
use std::time::Duration;

use crate::error::SourceError;

const MAX_DELAY_MS: u64 = 30_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:** connection failures, request timeouts, HTTP 429, HTTP 5xx,
/// and the collector's own per-call [`SourceError::Timeout`].
///
/// **Not retriable:** other 4xx statuses, malformed XML/JSON bodies and invalid
/// subject ids. Retrying returns the same answer.
pub(crate) fn is_retriable(err: &SourceError) -> bool {
    match err {
        SourceError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        SourceError::RateLimited { .. } | SourceError::Timeout { .. } => true,
        SourceError::UnexpectedStatus { status, .. } => *status >= 500,
        SourceError::Xml(_)
        | SourceError::Deserialize { .. }
        | SourceError::InvalidSubject(_)
        | SourceError::Internal(_) => false,
    }
}

/// Un-jittered delay before retry number `attempt` (1-based), capped at 30 s.
pub(crate) fn backoff_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    backoff_base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
        .min(MAX_DELAY_MS)
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 500`:
///
/// | Retry | Sleep before it            |
/// |-------|----------------------------|
/// | 1     | 500 ms × 2⁰ ± 25 % jitter  |
/// | 2     | 500 ms × 2¹ ± 25 % jitter  |
/// | 3     | 500 ms × 2² ± 25 % jitter  |
///
/// A `RateLimited` error with a `Retry-After` longer than the computed delay
/// stretches the sleep to honour it (still capped at 30 s).
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let mut capped = backoff_delay_ms(backoff_base_ms, attempt);
                if let SourceError::RateLimited {
                    retry_after_secs, ..
                } = &err
                {
                    capped = capped.max(retry_after_secs.saturating_mul(1000).min(MAX_DELAY_MS));
                }
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient source error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivalscope_core::SourceKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn timeout() -> SourceError {
        SourceError::Timeout {
            kind: SourceKind::News,
            secs: 1,
        }
    }

    fn deserialize_err() -> SourceError {
        let src = serde_json::from_str::<()>("invalid").unwrap_err();
        SourceError::Deserialize {
            context: "test".to_owned(),
            source: src,
        }
    }

    #[test]
    fn server_errors_are_retriable_client_errors_are_not() {
        assert!(is_retriable(&SourceError::UnexpectedStatus {
            status: 503,
            url: "http://x".to_owned()
        }));
        assert!(!is_retriable(&SourceError::UnexpectedStatus {
            status: 404,
            url: "http://x".to_owned()
        }));
    }

    #[test]
    fn parse_errors_are_not_retriable() {
        assert!(!is_retriable(&deserialize_err()));
        assert!(!is_retriable(&SourceError::InvalidSubject("a b".to_owned())));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay_ms(500, 1), 500);
        assert_eq!(backoff_delay_ms(500, 2), 1000);
        assert_eq!(backoff_delay_ms(500, 3), 2000);
        assert_eq!(backoff_delay_ms(500, 20), MAX_DELAY_MS);
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, SourceError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(timeout())
                } else {
                    Ok::<u32, SourceError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, SourceError>(timeout())
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(SourceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_non_retriable_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, SourceError>(deserialize_err())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SourceError::Deserialize { .. })));
    }
}
