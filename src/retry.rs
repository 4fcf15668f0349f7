//! Bounded retry with backoff
//!
//! One policy type covers both I/O families the indexer touches:
//!
//! | Target        | Default                | Why it fails transiently              |
//! |---------------|------------------------|---------------------------------------|
//! | Source files  | 5 attempts, fixed 1s   | Writer still holds the new file       |
//! | Search index  | 4 attempts, 250ms × 2ⁿ | Backend restarting, overloaded (429)  |
//!
//! Only errors whose [`IndexerError::is_transient`] is true are retried;
//! everything else is returned on the first attempt.

use std::time::Duration;

use crate::error::{IndexerError, Result};

/// Upper bound for a single sleep, whatever the backoff factor
const MAX_DELAY: Duration = Duration::from_secs(30);

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub delay: Duration,
    /// Multiplier applied to the wait after each failed attempt (1.0 = fixed)
    pub backoff: f64,
}

impl RetryPolicy {
    /// Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    /// Doubling delay between attempts
    pub fn exponential(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 2.0,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let factor = self.backoff.max(1.0).powi(exponent);
        let delay = self.delay.mul_f64(factor);
        delay.min(MAX_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Returns the last error on exhaustion; callers decide whether that is
/// terminal for their unit of work.
pub fn retry_with_policy<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("[RETRY] {} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let wait = policy.delay_after(attempt);
                tracing::warn!(
                    "[RETRY] {} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    attempt,
                    policy.max_attempts,
                    e,
                    wait
                );
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Whether an error returned by [`retry_with_policy`] means the budget ran out
pub fn exhausted(err: &IndexerError) -> bool {
    err.is_transient()
}
