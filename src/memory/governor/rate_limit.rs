//! Token bucket rate limiter.
//!
//! The bucket holds at most `rate` tokens (one second of burst) and refills continuously.
//! Clocks come from `tokio::time` so paused-time tests drive them deterministically.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Process-wide token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full bucket refilling at `ops_per_second`.
    #[must_use]
    pub fn new(name: &'static str, ops_per_second: f64) -> Self {
        let rate = if ops_per_second.is_finite() && ops_per_second > 0.0 {
            ops_per_second
        } else {
            1.0
        };
        let capacity = rate.max(1.0);
        Self {
            name,
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available. Never waits.
    pub fn try_acquire(&self) -> bool {
        let granted = self.take().is_none();
        if !granted {
            debug!(limiter = self.name, "rate limit denied");
        }
        granted
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.take() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Configured refill rate.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Take a token, or report how long until one will exist.
    fn take(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.rate, bucket.tokens).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }
}
