//! Global submission spacing shared by every worker of a batch.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Enforces a minimum interval between consecutive grants.
///
/// The wait and the timestamp update happen while holding one lock, so no
/// two callers can be granted slots closer than `min_interval`. Waiters are
/// served in the order they reached the lock.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Build a limiter from a requests-per-second ceiling.
    /// A non-positive or non-finite rate disables spacing.
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(min_interval)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next slot and return how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut last_grant = self.last_grant.lock().await;

        let wait = match *last_grant {
            Some(previous) => {
                (previous + self.min_interval).saturating_duration_since(Instant::now())
            }
            None => Duration::ZERO,
        };
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter holding submission");
            sleep(wait).await;
        }

        *last_grant = Some(Instant::now());
        wait
    }
}
