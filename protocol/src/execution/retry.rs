//! Bounded retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use super::ServiceError;
use crate::config::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF, MAX_RETRY_BACKOFF};

/// How hard to try before giving up on a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
    /// Backoff growth factor per retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_backoff: DEFAULT_RETRY_BACKOFF,
            max_backoff: MAX_RETRY_BACKOFF,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempts` tries with no waiting in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Wait before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails terminally, or runs out of attempts.
///
/// `op` receives the 1-based attempt number. Only
/// [`FailureKind::Transient`](super::FailureKind::Transient) errors are
/// retried; the last error is returned as is.
pub async fn retry_transient<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let wait = policy.backoff_for(attempt);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = wait.as_millis() as u64,
                    cause = %err.cause,
                    "transient execution failure, retrying"
                );
                sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_transient(&RetryPolicy::immediate(3), |_| async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::transient("node syncing"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_transient(&RetryPolicy::immediate(2), |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::transient("timeout"))
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_transient(&RetryPolicy::immediate(5), |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::terminal("reverted"))
        })
        .await;
        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = retry_transient(&RetryPolicy::default(), |_| async {
            Err(ServiceError::transient("timeout"))
        })
        .await;
        // 500ms + 1000ms for three attempts.
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }
}
