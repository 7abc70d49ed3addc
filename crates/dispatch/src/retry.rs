//! Bounded exponential-backoff executor.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry policy: attempt count bound plus capped exponential backoff.
///
/// Bounds attempt count, not wall-clock time of a single attempt; any hard
/// time bound belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-indexed): min(base * 2^(n-1), max).
    /// No jitter.
    pub fn delay_before_retry(&self, n: u32) -> Duration {
        if n == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(n - 1).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(factor).min(max_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Run `op`, retrying per `policy` while `retry_condition` holds.
///
/// Ineligible errors propagate immediately, consuming no further retries.
/// On exhaustion the final underlying error is returned unmodified.
pub async fn execute_with_retry<T, E, F, Fut, C>(
    mut op: F,
    policy: &RetryPolicy,
    retry_condition: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut retries_used = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retry_condition(&err) || retries_used >= policy.max_retries {
                    return Err(err);
                }
                retries_used += 1;
                let delay = policy.delay_before_retry(retries_used);
                debug!(
                    retry = retries_used,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error (retryable: {})", self.retryable)
        }
    }

    #[test]
    fn backoff_schedule_is_capped_exponential_without_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        };
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_before_retry(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_before_retry(5), Duration::from_millis(10_000));
        // determinism: same input, same delay
        assert_eq!(policy.delay_before_retry(3), policy.delay_before_retry(3));
    }

    // A permanently-failing transient op under {max_retries: 3, base 1000ms,
    // cap 10000ms} is attempted exactly 4 times with delays 1000/2000/4000,
    // then the original error surfaces.
    #[tokio::test(start_paused = true)]
    async fn exhaustion_attempts_four_times_with_doubling_delays() {
        let attempts = Arc::new(AtomicU32::new(0));
        let timestamps = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy::default();

        let a = attempts.clone();
        let t = timestamps.clone();
        let start = tokio::time::Instant::now();
        let result: Result<(), FakeError> = execute_with_retry(
            move || {
                let a = a.clone();
                let t = t.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    t.lock().unwrap().push(start.elapsed());
                    Err(FakeError { retryable: true })
                }
            },
            &policy,
            |e: &FakeError| e.retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let stamps = timestamps.lock().unwrap();
        assert_eq!(stamps[0], Duration::ZERO);
        assert_eq!(stamps[1], Duration::from_millis(1000));
        assert_eq!(stamps[2], Duration::from_millis(3000));
        assert_eq!(stamps[3], Duration::from_millis(7000));
    }

    // A non-retryable error surfaces after exactly one attempt.
    #[tokio::test]
    async fn ineligible_error_propagates_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result: Result<(), FakeError> = execute_with_retry(
            move || {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError { retryable: false })
                }
            },
            &RetryPolicy::default(),
            |e: &FakeError| e.retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_transient_failures_returns_value() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let result = execute_with_retry(
            move || {
                let a = a.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FakeError { retryable: true })
                    } else {
                        Ok(42)
                    }
                }
            },
            &policy,
            |e: &FakeError| e.retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
