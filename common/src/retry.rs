// Retry policy for queued jobs: exponential backoff with jitter
//
// Every job type (fetch, report email, failure email) gets the same budget:
// 3 attempts, delays doubling from a 2 second base (2s, 4s, 8s-capped).

use rand::Rng;
use std::time::Duration;

/// Total attempts per job, including the first delivery
pub const MAX_ATTEMPTS: u32 = 3;

/// Retry strategy trait for calculating redelivery delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, given the 1-based number of the attempt
    /// that just failed. Returns None once the budget is exhausted.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Check if more attempts are allowed after `attempt` failures
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < MAX_ATTEMPTS
    }

    fn max_attempts(&self) -> u32 {
        MAX_ATTEMPTS
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay in milliseconds (default: 2000)
    base_delay_ms: u64,
    /// Maximum delay in milliseconds (default: 30000)
    max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0, default: 0.1 = 10%)
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Sequence: 2s, 4s, 8s, ... doubling, capped at max_delay
    fn calculate_base_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(2_u64.pow(exponent));
        delay.min(self.max_delay_ms)
    }

    /// Random additive jitter so simultaneous failures do not retry in step
    fn add_jitter(&self, base_delay_ms: u64) -> u64 {
        if self.jitter_factor == 0.0 {
            return base_delay_ms;
        }

        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        if jitter_range_ms == 0 {
            return base_delay_ms;
        }

        let mut rng = rand::thread_rng();
        base_delay_ms + rng.gen_range(0..=jitter_range_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= MAX_ATTEMPTS {
            return None;
        }

        let base = self.calculate_base_delay(attempt);
        Some(Duration::from_millis(self.add_jitter(base)))
    }
}

/// Fixed delay strategy, used in tests
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= MAX_ATTEMPTS {
            return None;
        }
        Some(self.delay)
    }
}
