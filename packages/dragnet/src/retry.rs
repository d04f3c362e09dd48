//! Fixed-interval retry for fallible async operations.
//!
//! Unlike a backoff strategy, the delay between attempts is constant; the
//! persistence path wants a predictable worst-case duration rather than an
//! open-ended one.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy of `max_attempts` tries spaced `delay` apart. At least one
    /// attempt always runs.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Failed attempts are logged with their ordinal. Returns the last error
/// when every attempt fails; the caller decides whether that is fatal.
pub async fn retry_fixed<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!(
                    operation = operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "operation failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let calls = AtomicU32::new(0);

        let value = retry_fixed(RetryPolicy::default(), "noop", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(7) }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);

        let value = retry_fixed(
            RetryPolicy::new(3, Duration::from_secs(5)),
            "flaky",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("transient")
                    }
                    Ok(42)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_the_last_error_after_fixed_waits() {
        let start = tokio::time::Instant::now();

        let result: anyhow::Result<()> = retry_fixed(
            RetryPolicy::new(3, Duration::from_secs(5)),
            "broken",
            || async { anyhow::bail!("still broken") },
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "still broken");
        // Two waits between three attempts, at the fixed interval.
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }
}
