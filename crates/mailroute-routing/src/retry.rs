//! Explicit retry driver
//!
//! Re-invokes an operation with an increasing attempt number, sleeping
//! between attempts according to a backoff policy. Only errors for which
//! [`Error::is_retryable`] holds are retried; misconfiguration is returned
//! immediately.
//!
//! ```rust
//! use mailroute_routing::{Backoff, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     max_attempts: 4,
//!     backoff: Backoff::Exponential { base_ms: 100, max_ms: 250 },
//! };
//!
//! assert_eq!(policy.delay_after(1), Duration::from_millis(100));
//! assert_eq!(policy.delay_after(2), Duration::from_millis(200));
//! assert_eq!(policy.delay_after(3), Duration::from_millis(250)); // capped
//! ```

use mailroute_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Delay between two attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,
    /// Same delay after every failed attempt
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^(failed_attempt - 1)`, capped at `max_ms`
    Exponential { base_ms: u64, max_ms: u64 },
}

/// Bounded retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::send_default()
    }
}

impl RetryPolicy {
    /// Outbound sends: 5 attempts, no delay
    pub fn send_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::None,
        }
    }

    /// Inbound receives: 5 attempts, one second apart
    pub fn receive_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::Fixed { delay_ms: 1000 },
        }
    }

    /// A single attempt, never retried
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if let Backoff::Exponential { base_ms, max_ms } = self.backoff {
            if max_ms < base_ms {
                return Err(Error::Config(
                    "exponential backoff max_ms must be >= base_ms".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Delay to wait after failed attempt number `failed_attempt` (1-based)
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let exponent = failed_attempt.saturating_sub(1);
                let multiplier = 2u64.saturating_pow(exponent);
                Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
            }
        }
    }
}

/// Milliseconds in `delay`, saturating at `u64::MAX`
fn whole_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Drives an operation through a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryDriver {
    policy: RetryPolicy,
}

impl RetryDriver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = whole_millis(delay),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(attempt, error = %err, "Retry attempts exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
