use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::UploadError;

/// Upper bound for the randomized delay between attempts.
const MAX_BACKOFF_MS: u64 = 1000;

/// Sleep for a uniformly sampled duration, independent per attempt, so
/// concurrently failing chunks do not retry in lockstep.
pub async fn sleep_jittered() {
    let ms = rand::thread_rng().gen_range(0..=MAX_BACKOFF_MS);
    debug!("sleeping: {} ms", ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Run `op` up to `budget` times with jittered backoff between attempts.
///
/// Every remote session operation (create, part upload, complete) goes
/// through this single policy.
pub async fn with_backoff<T, F, Fut>(what: &str, budget: u32, mut op: F) -> Result<T, UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < budget => {
                warn!("{}: error: {:#}", what, err);
                warn!("{}: retrying ({}/{})", what, attempt, budget);
                sleep_jittered().await;
                attempt += 1;
            }
            Err(err) => {
                return Err(UploadError::RetriesExceeded {
                    what: what.to_string(),
                    attempts: budget,
                    reason: format!("{:#}", err),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_backoff("op", 4, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_backoff("op", 4, || {
            let counter = counter.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    bail!("transient failure");
                }
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_backoff("doomed op", 3, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                bail!("permanent failure");
            }
        })
        .await;

        match result.unwrap_err() {
            UploadError::RetriesExceeded { what, attempts, .. } => {
                assert_eq!(what, "doomed op");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
