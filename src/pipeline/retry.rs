// src/pipeline/retry.rs

//! Rate-limit back-off for per-repository lookups.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Run `op`; if it reports a rate limit, sleep `backoff` and run it exactly
/// once more. The second outcome is returned as-is, rate limit or not.
///
/// Other errors are returned immediately without retrying.
pub async fn with_single_retry<T, F, Fut>(what: &str, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if e.is_rate_limited() => {
            log::warn!("Rate limited on {what}, waiting {}s before retrying", backoff.as_secs());
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}
