//! Exponential backoff with jitter for retried steps.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff, matching the reference repository's
/// `RetryPolicy` shape (initial/max interval, 2x coefficient, jitter
/// fraction) but scoped to this engine's single knob set: `max_attempts`,
/// `backoff_base`, `backoff_cap`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay before the first retry.
    pub base: Duration,
    /// Ceiling no computed delay exceeds.
    pub cap: Duration,
    /// Jitter fraction (0.0-1.0); 0.1 means ±10% randomness.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            cap: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before retrying the given 1-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let uncapped = self.base.as_secs_f64() * 2f64.powi(exponent as i32);
        let capped = uncapped.min(self.cap.as_secs_f64());

        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let mut rng = rand::thread_rng();
        let range = capped * self.jitter;
        let jittered = (capped + rng.gen_range(-range..=range)).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}
