//! Bounded fixed-delay retry.
//!
//! Read-side convergence is polled, never the mutating operation: a check is
//! re-run until it returns `Ok` or the attempt budget is spent, and the last
//! error is handed back.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;

/// Default number of attempts per check.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Attempt budget and fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Wait between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with an explicit budget.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Worst-case time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Budget exhausted; carries the last error.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    /// Attempts made
    pub attempts: u32,
    /// Error of the final attempt
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Run `check` until it succeeds or `policy.max_attempts` is reached.
///
/// Attempts never overlap: each one completes before the delay starts.
pub async fn retry_until_ok<T, E, F, Fut>(
    policy: RetryPolicy,
    mut check: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match check().await {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last,
                })
            }
            Err(e) => {
                debug!(
                    "check attempt {}/{} not converged: {}",
                    attempt, max_attempts, e
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
