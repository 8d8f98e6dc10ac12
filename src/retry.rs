//! Retry policies and backoff math.
//!
//! The delay for attempt `n` (0-based) is
//! `min(base * 2^n, max_delay) * (1 + jitter_fraction * r)` with `r` uniform in
//! `[0, 1)`. Jitter only ever lengthens the wait.

use crate::category::ErrorCategory;
use crate::settings::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Configurable retry policy for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of automatic retries.
    pub max_retries: u32,
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of the backoff.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Policy for non-network categories: 1s base, 10s cap, 30% jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter_fraction: 0.3,
        }
    }

    /// Policy for network-bound categories: same base, 30s cap.
    pub fn network() -> Self {
        Self {
            max_delay: Duration::from_millis(30_000),
            ..Self::standard()
        }
    }

    /// Policy for a category under the given settings.
    pub fn for_category(category: ErrorCategory, settings: &RetrySettings) -> Self {
        let max_delay = if category.uses_network_backoff() {
            settings.network_max_delay
        } else {
            settings.generic_max_delay
        };
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            max_delay,
            jitter_fraction: settings.jitter_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter_fraction(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction.clamp(0.0, 1.0);
        self
    }

    /// Capped exponential backoff for `attempt`, before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(31) as i32;
        let raw_ms = self.base_delay.as_millis() as f64 * 2f64.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Delay for `attempt` with an explicit jitter sample in `[0, 1)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let sample = sample.clamp(0.0, 1.0);
        scale(self.backoff(attempt), 1.0 + self.jitter_fraction * sample)
    }

    /// Delay for `attempt` with random jitter.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::thread_rng().gen();
        self.delay_with_sample(attempt, sample)
    }

    /// Inclusive range every jittered delay for `attempt` falls in.
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let low = self.backoff(attempt);
        (low, scale(low, 1.0 + self.jitter_fraction))
    }

    /// Check if another automatic retry is allowed after `retry_count` failures.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::from_nanos((delay.as_nanos() as f64 * factor).round() as u64)
}
