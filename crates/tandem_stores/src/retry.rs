//! Retry with exponential backoff.
//!
//! Both adapters route every network call through one [`RetryPolicy`], so
//! paging, writes and probes share the same attempt budget and delays.

use crate::error::{StoreError, StoreResult};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` and a one second base delay.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Runs `op`, retrying every error that [`StoreError::is_retryable`]
    /// accepts.
    pub fn run<T>(
        &self,
        operation: &str,
        op: impl FnMut() -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.run_if(operation, StoreError::is_retryable, op)
    }

    /// Runs `op`, retrying only the errors `should_retry` accepts.
    ///
    /// Used for non-idempotent calls, which may only be repeated when the
    /// store is known not to have processed the first attempt.
    pub fn run_if<T>(
        &self,
        operation: &str,
        should_retry: impl Fn(&StoreError) -> bool,
        mut op: impl FnMut() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !should_retry(&err) => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(StoreError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let mut delay = self.delay_for_attempt(attempt);
                    if let StoreError::RateLimited {
                        retry_after: Some(requested),
                    } = &err
                    {
                        delay = delay.max(*requested);
                    }

                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_initial_delay(Duration::ZERO)
            .with_jitter(false)
    }

    #[test]
    fn retry_policy_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_with_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(5).with_initial_delay(Duration::from_millis(100));
        let delay = policy.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn retry_delay_respects_max() {
        let policy = RetryPolicy::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = instant(3).run("fetch", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StoreError::Timeout)
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: StoreResult<()> = instant(3).run("fetch page 3", || {
            calls.set(calls.get() + 1);
            Err(StoreError::transport_retryable("connection reset"))
        });

        assert_eq!(calls.get(), 3);
        match result {
            Err(StoreError::RetriesExhausted {
                operation,
                attempts,
                last,
            }) => {
                assert_eq!(operation, "fetch page 3");
                assert_eq!(attempts, 3);
                assert!(matches!(*last, StoreError::Transport { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: StoreResult<()> = instant(5).run("upsert", || {
            calls.set(calls.get() + 1);
            Err(StoreError::Status {
                status: 400,
                body: "bad request".into(),
            })
        });

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(StoreError::Status { status: 400, .. })));
    }

    #[test]
    fn run_if_limits_retries_to_predicate() {
        let calls = Cell::new(0);
        let result: StoreResult<()> =
            instant(5).run_if("create", StoreError::is_rate_limited, || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(StoreError::RateLimited { retry_after: None })
                } else {
                    Err(StoreError::Timeout)
                }
            });

        assert_eq!(calls.get(), 2);
        assert!(matches!(result, Err(StoreError::Timeout)));
    }
}
