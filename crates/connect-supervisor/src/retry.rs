//! Backoff schedule for restart attempts

use crate::config::RestartSettings;
use std::time::Duration;

/// Exponential backoff with a deterministic jitter
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl BackoffSchedule {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: 0.1,
        }
    }

    /// Schedule without jitter, mainly for tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before retry `attempt` (1-indexed; attempt 0 runs immediately)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // cap the exponent to avoid f64 blowup on pathological settings
        let capped = attempt.min(30);
        let base =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(capped as i32 - 1);
        let capped_delay = base.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter_factor > 0.0 {
            // golden-ratio sequence keeps the jitter reproducible per attempt
            let phase = (attempt as f64 * 0.618033988749895) % 1.0;
            capped_delay * self.jitter_factor * (phase - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }
}

impl From<&RestartSettings> for BackoffSchedule {
    fn from(settings: &RestartSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
            settings.backoff_multiplier,
        )
    }
}
