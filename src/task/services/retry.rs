//! Retry policy for calls to external collaborators.

use crate::task::ports::CollaboratorError;
use std::future::Future;
use std::time::Duration;

/// Predicate deciding whether a failed attempt may be retried.
pub type RetryPredicate = fn(&CollaboratorError) -> bool;

/// Bounded exponential backoff with a per-attempt deadline.
///
/// The delay before retry `n` (counting failed attempts from one) is
/// `base_delay * multiplier^(n - 1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Backoff growth factor.
    pub multiplier: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Deadline applied to every attempt.
    pub attempt_timeout: Duration,
    /// Classifies failures as retryable.
    pub retryable: RetryPredicate,
}

/// Final error of a retried call together with the attempts spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error of the last attempt.
    pub error: CollaboratorError,
}

impl RetryPolicy {
    /// Creates a policy that doubles the delay and retries transient
    /// failures only.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2,
            max_delay: Duration::from_secs(30),
            attempt_timeout,
            retryable: CollaboratorError::is_transient,
        }
    }

    /// Replaces the retry predicate.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Replaces the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Calculates the delay after `attempts` failed attempts.
    ///
    /// Zero is treated like one.
    #[must_use]
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        self.multiplier
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `call` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// `call` receives the 1-based attempt number. Attempts exceeding
    /// `attempt_timeout` fail with [`CollaboratorError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhausted`] carrying the last error.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let result = tokio::time::timeout(self.attempt_timeout, call(attempt))
                .await
                .unwrap_or_else(|_elapsed| Err(CollaboratorError::Timeout(self.attempt_timeout)));
            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.max_attempts || !(self.retryable)(&error) {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    "collaborator call failed permanently"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.next_delay(attempt);
            tracing::warn!(
                operation,
                attempt,
                delay = ?delay,
                error = %error,
                "collaborator call failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
