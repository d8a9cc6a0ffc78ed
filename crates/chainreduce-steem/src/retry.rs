//! Retry schedule for transient transport failures.

use std::time::Duration;

/// How often and how patiently to retry a failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays; values below 1 are treated as 1.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fail on the first error.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A fresh schedule; one per request.
    pub fn schedule(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff.min(self.max_backoff),
            remaining: self.max_retries,
            multiplier: self.multiplier.max(1.0),
            cap: self.max_backoff,
        }
    }
}

/// The delays to sleep before each retry, growing geometrically up to the cap.
/// Exhausted after `max_retries` items.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    remaining: u32,
    multiplier: f64,
    cap: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next;
        let grown = delay.as_nanos() as f64 * self.multiplier;
        let cap = self.cap.as_nanos() as f64;
        self.next = Duration::from_nanos(grown.min(cap) as u64);
        Some(delay)
    }
}
