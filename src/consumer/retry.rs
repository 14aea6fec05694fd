//! Retry policy for failed deliveries and bounded retry of broker calls

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum allowed attempts per delivery
const MAX_ATTEMPTS_LIMIT: u32 = 100;
/// Maximum backoff duration to prevent excessive delays
const MAX_BACKOFF_SECONDS: u64 = 3600; // 1 hour
/// Maximum multiplier to prevent exponential explosion
const MAX_MULTIPLIER: f64 = 100.0;
/// Maximum jitter factor
const MAX_JITTER_FACTOR: f64 = 1.0;

fn validate_max_attempts<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u32::deserialize(deserializer)?;
    if value == 0 || value > MAX_ATTEMPTS_LIMIT {
        return Err(serde::de::Error::custom(format!(
            "max_attempts {} must be between 1 and {}",
            value, MAX_ATTEMPTS_LIMIT
        )));
    }
    Ok(value)
}

fn validate_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let duration = Duration::deserialize(deserializer)?;
    if duration.as_secs() > MAX_BACKOFF_SECONDS {
        return Err(serde::de::Error::custom(format!(
            "duration {:?} exceeds maximum allowed {} seconds",
            duration, MAX_BACKOFF_SECONDS
        )));
    }
    Ok(duration)
}

fn validate_multiplier<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || !(1.0..=MAX_MULTIPLIER).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "backoff_multiplier {} must be finite and between 1.0 and {}",
            value, MAX_MULTIPLIER
        )));
    }
    Ok(value)
}

fn validate_jitter<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || !(0.0..=MAX_JITTER_FACTOR).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "jitter_factor {} must be finite and between 0.0 and {}",
            value, MAX_JITTER_FACTOR
        )));
    }
    Ok(value)
}

/// What to do with a delivery whose processing failed transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back with the counter bumped, after `delay`
    Requeue {
        /// Counter carried by the redelivery
        next_retry_count: u32,
        /// Wait before republishing
        delay: Duration,
    },
    /// Attempts exhausted
    DeadLetter {
        /// Total attempts made, including this one
        attempts: u32,
    },
}

/// Retry policy with validated bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total processing attempts per message, first delivery included
    #[serde(deserialize_with = "validate_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first requeue
    #[serde(deserialize_with = "validate_duration")]
    pub initial_backoff: Duration,
    /// Upper bound on the delay
    #[serde(deserialize_with = "validate_duration")]
    pub max_backoff: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential)
    #[serde(deserialize_with = "validate_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(deserialize_with = "validate_jitter")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy that requeues immediately
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Policy with fixed backoff
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: backoff,
            max_backoff: backoff,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Decide between requeue and dead-letter for a delivery that carried
    /// `retry_count` (0 on first delivery)
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count.saturating_add(1) < self.max_attempts {
            let next_retry_count = retry_count + 1;
            RetryDecision::Requeue {
                next_retry_count,
                delay: self.next_backoff(next_retry_count),
            }
        } else {
            RetryDecision::DeadLetter {
                attempts: retry_count.saturating_add(1),
            }
        }
    }

    /// Backoff before retry number `retry` (1-based). Zero for `retry == 0`.
    pub fn next_backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let exponent = (retry - 1).min(30) as i32;
        let multiplier = self.backoff_multiplier.powi(exponent);
        let base = if multiplier.is_finite() {
            self.initial_backoff.as_secs_f64() * multiplier
        } else {
            self.max_backoff.as_secs_f64()
        };
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jitter = capped * self.jitter_factor * rand::random::<f64>();
        let backoff = Duration::from_secs_f64(capped + jitter);

        debug!("Calculated backoff for retry {}: {:?}", retry, backoff);
        backoff
    }
}

/// Result of [`RetryExecutor::execute`]
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Success after `attempts` retries
    Success { value: T, attempts: u32 },
    /// Failed after exhausting retries
    Failed { error: E, attempts: u32 },
}

/// Runs an async operation with a small number of in-process retries.
/// Used for broker settle calls, never for message processing.
pub struct RetryExecutor {
    max_retries: u32,
    backoff: Duration,
}

impl RetryExecutor {
    /// Executor retrying up to `max_retries` times, doubling `backoff`
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Execute with a retry predicate
    pub async fn execute_with_predicate<F, Fut, P, T, E>(
        &self,
        mut operation: F,
        mut should_retry: P,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut backoff = self.backoff;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return RetryResult::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    if attempt >= self.max_retries || !should_retry(&error) {
                        warn!("Operation failed after {} attempts: {}", attempt + 1, error);
                        return RetryResult::Failed {
                            error,
                            attempts: attempt,
                        };
                    }

                    attempt += 1;
                    warn!(
                        "Operation failed (attempt {}), retrying in {:?}: {}",
                        attempt, backoff, error
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }
}
