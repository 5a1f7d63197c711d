use std::time::Duration;

use rand::Rng;

/// Counts consecutive failures and works out how long to wait before the next attempt.
/// The n-th failure waits `min(initial * 2^(n-1), max)` plus up to 10% jitter.
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_failures: u32,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_failures: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_failures,
            failures: 0,
        }
    }

    /// Records a failure and returns the delay before retrying, or None when the
    /// number of consecutive failures has gone past the threshold
    pub fn failure(self: &mut Self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.max_failures {
            return None;
        }
        let base = self.base_delay(self.failures);
        Some(base + jitter(base))
    }

    pub fn reset(self: &mut Self) {
        self.failures = 0;
    }

    pub fn failures(self: &Self) -> u32 {
        self.failures
    }

    pub fn base_delay(self: &Self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

fn jitter(base: Duration) -> Duration {
    let range = base.as_millis() as u64 / 10;
    if range == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..=range))
    }
}
