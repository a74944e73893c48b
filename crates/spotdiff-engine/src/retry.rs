use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::backend::is_retry_worthy;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);

/// Bounded exponential backoff for retry-worthy backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

/// Runs `op`, retrying only rate-limit, quota and overload failures.
///
/// The delay doubles after every retry. Any other error, or the last error
/// once the budget is spent, is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = policy.retries;
    let mut delay = policy.initial_delay;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if remaining == 0 || !is_retry_worthy(&err) {
                    return Err(err);
                }
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    remaining,
                    error = %err,
                    "backend limit hit, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                remaining -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::anyhow;
    use tokio::time::Instant;

    use super::{with_retry, RetryPolicy};
    use crate::backend::GenerationError;

    async fn flaky_run(failures: u32) -> (anyhow::Result<u32>, Vec<Instant>) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(RetryPolicy::default(), || {
            let attempts = Arc::clone(&attempts);
            let calls = Arc::clone(&calls);
            async move {
                if let Ok(mut rows) = attempts.lock() {
                    rows.push(Instant::now());
                }
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    return Err(anyhow::Error::new(GenerationError::rate_limited(
                        "429 Too Many Requests",
                    )));
                }
                Ok(n)
            }
        })
        .await;
        let stamps = attempts.lock().map(|rows| rows.clone()).unwrap_or_default();
        (result, stamps)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_failures_fit_the_budget() {
        for failures in 0..=3 {
            let (result, stamps) = flaky_run(failures).await;
            assert_eq!(result.ok(), Some(failures));
            assert_eq!(stamps.len() as u32, failures + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget_with_last_error() {
        let (result, stamps) = flaky_run(4).await;
        let err = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(err, "429 Too Many Requests");
        assert_eq!(stamps.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_attempts() {
        let (_, stamps) = flaky_run(3).await;
        let gaps: Vec<Duration> = stamps.windows(2).map(|pair| pair[1] - pair[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();
        let result: anyhow::Result<()> = with_retry(RetryPolicy::default(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!(GenerationError::blocked("Blocked or failed front image")))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
