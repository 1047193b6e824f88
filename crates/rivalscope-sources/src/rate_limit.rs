//! Per-collector leaky-bucket rate limiter.
//!
//! Each collector owns one limiter; limiters never coordinate with each other
//! because every collector talks to a different upstream with its own limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum spacing between calls, allowing a small burst.
///
/// Implemented as a virtual-scheduling leaky bucket: the limiter tracks the
/// theoretical arrival time of the next call and makes callers sleep until
/// their slot. Waiters do not hold the lock while sleeping.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// `interval` is the minimum spacing between calls once the burst is
    /// spent. A zero interval disables limiting.
    #[must_use]
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst: burst.max(1),
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a call is permitted.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let wait = {
            let mut slot = self.next_slot.lock().await;
            let now = Instant::now();
            let tat = slot.map_or(now, |t| t.max(now));
            let allowance = self.interval * (self.burst - 1);
            *slot = Some(tat + self.interval);
            tat.duration_since(now).saturating_sub(allowance)
        };
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis(), "rate limiter delaying call");
            tokio::time::sleep(wait).await;
        }
    }
}
