//! A small, pure exponential-backoff-with-jitter helper (spec §9's design
//! note: keep this "small, pure... testable without I/O"). [`backoff_delay`]
//! computes delays; [`with_backoff`] drives an async fallible operation
//! through them. Used by [`store`](crate::store) to retry datastore inserts.

use std::time::Duration;

use rand::Rng;

/// Parameters controlling a retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound any computed delay is clamped to.
    pub max_delay: Duration,
    /// Fraction of the computed delay randomized away, in `[0.0, 1.0]`.
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    /// The policy used by [`store`](crate::store) for measurement inserts:
    /// 5 attempts, 100ms base delay, 5s cap, 25% jitter.
    pub const fn datastore() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.25,
        }
    }
}

/// Computes the delay before attempt `attempt` (1-indexed: the delay before
/// the *second* attempt is `backoff_delay(policy, 1)`), as
/// `base_delay * 2^(attempt - 1)`, clamped to `max_delay` and then jittered
/// by up to `jitter_fraction` in either direction.
///
/// Pure and deterministic given a seeded RNG; this function uses the thread
/// RNG, so callers wanting reproducible tests should exercise the delay
/// math through [`unjittered_delay`] instead.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = unjittered_delay(policy, attempt);
    if policy.jitter_fraction <= 0.0 {
        return base;
    }
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(-policy.jitter_fraction..=policy.jitter_fraction);
    let factor = (1.0 + jitter).max(0.0);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

/// The jitter-free exponential backoff delay for `attempt`, clamped to
/// `policy.max_delay`. Exposed separately so the exponential growth itself
/// can be tested without fighting randomness.
pub fn unjittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
    let scaled = policy.base_delay.saturating_mul(exp as u32);
    scaled.min(policy.max_delay)
}

/// Drives `operation` until it succeeds, a non-retryable error is returned,
/// or `policy.max_attempts` is exhausted.
///
/// `is_retryable` classifies each error; a `false` result short-circuits
/// the loop and returns that error immediately, without sleeping. On
/// exhaustion the last observed error is returned.
pub async fn with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }
                let delay = backoff_delay(policy, attempt);
                tracing::debug!(attempt, ?delay, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn unjittered_delay_doubles_each_attempt() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.0,
        };
        assert_eq!(unjittered_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(unjittered_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(unjittered_delay(&policy, 3), Duration::from_millis(400));
    }

    #[test]
    fn unjittered_delay_clamps_to_max() {
        let policy = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter_fraction: 0.0,
        };
        assert_eq!(unjittered_delay(&policy, 10), Duration::from_millis(500));
    }

    #[test]
    fn zero_jitter_delay_is_exact() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.0,
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn with_backoff_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter_fraction: 0.0,
        };
        let result: Result<u32, &str> = with_backoff(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_backoff_stops_immediately_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::datastore();
        let result: Result<u32, &str> = with_backoff(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
            |_| false,
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_backoff_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter_fraction: 0.0,
        };
        let result: Result<u32, &str> = with_backoff(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still failing") }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
