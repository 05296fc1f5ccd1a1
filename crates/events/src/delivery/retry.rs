//! Exponential-backoff schedule for callback delivery.

use std::time::Duration;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts made after the first one fails. `0` disables retry.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculate the next backoff delay, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    /// The sleep before each retry, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_retries as usize);
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 0..self.max_retries {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }
}
