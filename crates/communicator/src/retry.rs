//! Retry policy with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::CommError;

/// Delivery attempt limit and backoff schedule.
///
/// The delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`,
/// capped at `max_delay`, so the schedule is monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Returns the backoff delay after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = (self.multiplier as u64).saturating_pow(exponent);
        let delay = self
            .base_delay
            .checked_mul(factor.try_into().unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }
}

/// Runs `op` under the policy, retrying retryable failures.
///
/// The closure receives the 1-based attempt number. A retryable error on
/// the final attempt is wrapped in [`CommError::RetriesExhausted`] carrying
/// the attempt count; non-retryable errors are returned untouched.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, CommError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CommError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                return Err(CommError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::Participant;

    fn timeout_err() -> CommError {
        CommError::Timeout {
            participant: Participant::Shipping,
            timeout_ms: 100,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_schedule_doubles_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(6), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_schedule_is_monotonic() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=40 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let result = execute_with_retry(&fast_policy(3), |_| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_recovers_after_retryable_failures() {
        let result = execute_with_retry(&fast_policy(3), |attempt| async move {
            if attempt < 3 {
                Err(timeout_err())
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempt_count() {
        let result: Result<u32, _> =
            execute_with_retry(&fast_policy(3), |_| async { Err(timeout_err()) }).await;
        match result.unwrap_err() {
            CommError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), "timeout");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_untouched() {
        let mut calls = 0;
        let result: Result<u32, _> = execute_with_retry(&fast_policy(3), |_| {
            calls += 1;
            async {
                Err(CommError::BadStatus {
                    participant: Participant::Payment,
                    status: 402,
                })
            }
        })
        .await;
        assert_eq!(calls, 1);
        assert_eq!(
            result.unwrap_err(),
            CommError::BadStatus {
                participant: Participant::Payment,
                status: 402,
            }
        );
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_sleeps() {
        let result: Result<u32, _> =
            execute_with_retry(&RetryPolicy::no_retry(), |_| async { Err(timeout_err()) }).await;
        match result.unwrap_err() {
            CommError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
