//! Generic retry-with-backoff for downstream calls.
//!
//! A `RetryPolicy` is a plain value object; `retry_call` consumes it
//! together with an error classifier, so the policy is independent of any
//! particular I/O call.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Whether a failed attempt may be tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Transient,
    Permanent,
}

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff.
    pub max_backoff: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to the backoff duration.
    pub add_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy used for downstream sync mirrors: five attempts total, after
    /// which the task is marked permanently failed.
    pub fn sync_mirror() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff duration before retry number `retry` (0-based).
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(retry as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = (backoff_ms as f64 * 0.25 * clock_jitter()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Pseudo-random jitter (0.0 to 1.0) derived from the clock, no RNG dependency.
fn clock_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Execute an async operation under a retry policy.
///
/// `classify` decides whether a given error is worth another attempt;
/// permanent errors are returned immediately.
pub async fn retry_call<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    operation_name: &str,
    classify: C,
    f: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> Retryability,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                attempt += 1;

                if attempt >= policy.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %err,
                        "call failed after max attempts"
                    );
                    return Err(err);
                }

                if classify(&err) == Retryability::Permanent {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "call failed with permanent error, not retrying"
                    );
                    return Err(err);
                }

                let backoff = policy.backoff_duration(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %err,
                    backoff_ms = backoff.as_millis(),
                    "call failed, retrying after backoff"
                );

                sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_sync_mirror_ceiling() {
        assert_eq!(RetryPolicy::sync_mirror().max_attempts, 5);
    }

    #[test]
    fn test_backoff_duration() {
        let policy = RetryPolicy {
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(policy.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = RetryPolicy {
            add_jitter: false,
            max_backoff: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(policy.backoff_duration(5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let policy = RetryPolicy::default();
        let result = retry_call(
            &policy,
            "test_op",
            |_: &String| Retryability::Transient,
            || async { Ok::<_, String>(42) },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_permanent_failure_stops_early() {
        let policy = RetryPolicy {
            add_jitter: false,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result = retry_call(
            &policy,
            "test_op",
            |_: &String| Retryability::Permanent,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("bad input".to_string())
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_makes_a_single_attempt() {
        let policy = RetryPolicy::no_retry();
        let calls = AtomicU32::new(0);
        let result = retry_call(
            &policy,
            "test_op",
            |_: &String| Retryability::Transient,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("down".to_string())
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            add_jitter: false,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 1.0,
        };
        let calls = AtomicU32::new(0);
        let result = retry_call(
            &policy,
            "test_op",
            |_: &String| Retryability::Transient,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("still down".to_string())
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
