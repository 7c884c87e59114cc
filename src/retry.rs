use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for submission retry behavior.
///
/// Only transient submission failures consume this budget. Poll errors and
/// remote job failures never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first submission attempt.
    pub max_retries: u32,
    /// Delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound in milliseconds for any single backoff delay.
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the backoff delay for a zero-based retry attempt.
    /// delay = min(initial_delay_ms * exponential_base^attempt, max_delay_ms)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max = self.max_delay_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.exponential_base.powi(exponent);

        let ms = if raw.is_finite() && raw >= 0.0 {
            raw.min(max)
        } else {
            max
        };
        Duration::from_millis(ms.round() as u64)
    }

    /// Total number of submission calls allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
