//! Bounded retry for ledger and result-store writes.
//!
//! Stage outcomes must reach the ledger, otherwise a record stays `Running`
//! and nothing downstream ever picks it up. Writes are retried with
//! exponential back-off; rejections and missing records are returned at once
//! because replaying them gives the same answer.

use std::future::Future;
use std::time::Duration;

use rivalscope_ledger::LedgerError;

const STORE_WRITE_ATTEMPTS: u32 = 5;
const STORE_WRITE_BASE_DELAY: Duration = Duration::from_millis(200);

fn is_retriable(err: &LedgerError) -> bool {
    !matches!(
        err,
        LedgerError::AlreadyExists(_)
            | LedgerError::NotFound(_)
            | LedgerError::JobNotFound(_)
            | LedgerError::AnalysisNotFound(_)
            | LedgerError::Rejected(_)
    )
}

/// Runs `write` up to five times, sleeping 200 ms, 400 ms, 800 ms and 1.6 s
/// between attempts.
pub(crate) async fn retry_store_write<T, F, Fut>(
    what: &'static str,
    mut write: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 1u32;
    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < STORE_WRITE_ATTEMPTS && is_retriable(&err) => {
                let delay = STORE_WRITE_BASE_DELAY * (1u32 << (attempt - 1));
                tracing::warn!(what, attempt, ?delay, error = %err, "store write failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
