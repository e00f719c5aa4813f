//! Exponential-backoff retry with jitter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use harvester_core::{HarvesterError, HarvesterResult, RetryConfig};

/// Retries an async operation under a backoff policy.
///
/// The delay before attempt `n + 1` is
/// `min(base_delay * backoff_factor^(n-1), max_delay)` plus a
/// non-negative jitter fraction, clamped so it never exceeds `max_delay`.
/// After `max_attempts` failed attempts the last error is returned
/// unchanged.
#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryConfig,
}

impl RetryManager {
    pub fn new(policy: RetryConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    /// Retry every failure until the attempt budget runs out.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> HarvesterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvesterResult<T>>,
    {
        self.execute_where(operation, |_| true).await
    }

    /// Retry only failures the predicate accepts; anything else is
    /// returned immediately. Used by the recovery facade to stop on
    /// non-retryable errors.
    pub async fn execute_where<F, Fut, T, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> HarvesterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvesterResult<T>>,
        P: Fn(&HarvesterError) -> bool,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.policy.max_attempts || !should_retry(&error) {
                        if attempt >= self.policy.max_attempts {
                            warn!(attempt, "giving up after final attempt: {error}");
                        }
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off: {error}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff delay after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay_ms as f64;
        let max = self.policy.max_delay_ms as f64;

        let exponential = base * self.policy.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let capped = exponential.min(max);
        let jitter = capped * self.policy.jitter_factor * rand::random::<f64>();
        let final_delay = (capped + jitter).min(max);

        Duration::from_millis(final_delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            backoff_factor: 2.0,
            max_delay_ms: 8,
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_k_failures_with_exactly_k_plus_one_calls() {
        let manager = RetryManager::new(fast_policy(5));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let result = manager
            .execute(move || {
                let calls = Arc::clone(&calls_ref);
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    if call < 3 {
                        Err(HarvesterError::Network("flaky".into()))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_last_error_returned_unchanged_after_budget() {
        let manager = RetryManager::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let err = manager
            .execute(move || {
                let calls = Arc::clone(&calls_ref);
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HarvesterError::Network(format!("failure {call}")))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // the error of the final attempt, not a wrapper
        assert_eq!(err.to_string(), "Network error: failure 2");
    }

    #[tokio::test]
    async fn test_predicate_stops_non_retryable_immediately() {
        let manager = RetryManager::new(fast_policy(5));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = Arc::clone(&calls);

        let err = manager
            .execute_where(
                move || {
                    let calls = Arc::clone(&calls_ref);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(HarvesterError::DataValidation("bad shape".into()))
                    }
                },
                HarvesterError::is_retryable,
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, HarvesterError::DataValidation(_)));
    }

    #[test]
    fn test_delay_follows_exponential_formula() {
        let manager = RetryManager::new(RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 1_000,
            jitter_factor: 0.0,
        });

        assert_eq!(manager.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(manager.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(manager.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(manager.delay_for_attempt(4), Duration::from_millis(800));
        // capped at max_delay from here on
        assert_eq!(manager.delay_for_attempt(5), Duration::from_millis(1_000));
        assert_eq!(manager.delay_for_attempt(9), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_never_lowers_or_exceeds_bounds() {
        let manager = RetryManager::new(RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 1_000,
            jitter_factor: 0.5,
        });

        for attempt in 1..=8 {
            let floor = (100.0 * 2.0f64.powi(attempt as i32 - 1)).min(1_000.0) as u64;
            for _ in 0..20 {
                let delay = manager.delay_for_attempt(attempt).as_millis() as u64;
                assert!(delay >= floor, "attempt {attempt}: {delay} < {floor}");
                assert!(delay <= 1_000, "attempt {attempt}: {delay} above cap");
            }
        }
    }
}
