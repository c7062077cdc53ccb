//! Retry policy for transient transport failures.

use std::time::Duration;

/// Bounded retry with a configurable inter-attempt delay.
///
/// The default is a single attempt (no retry). The delay grows by
/// `backoff_multiplier` per attempt, capped at `max_delay`; the default
/// multiplier of 1.0 keeps it fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_millis(50),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay to sleep after the given failed attempt (1-based).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let delay_ms = (self.delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}
