//! # Backoff Calculator
//!
//! Retry delay schedule owned by the broker.
//!
//! Delay after the n-th failed attempt is `base * multiplier^(n-1)` with
//! optional symmetric jitter so a burst of failures does not come back as a
//! burst of retries. The result never exceeds `max_delay_seconds`, nor the
//! global backoff ceiling when the configuration skipped validation.

use std::time::Duration;

use crate::config::BackoffConfig;
use crate::constants::system;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the attempt following `failed_attempt` (1-based)
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let mut delay_seconds = self.exponential_delay(failed_attempt);

        if self.config.jitter_enabled {
            delay_seconds = self.apply_jitter(delay_seconds);
        }

        clamp_to_duration(delay_seconds, self.config.max_delay_seconds)
    }

    /// Uncapped-by-jitter delay, for inspection and tests
    pub fn exponential_delay(&self, failed_attempt: u32) -> f64 {
        let exponent = i32::try_from(failed_attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let exponential = self.config.base_delay_seconds * self.config.multiplier.powi(exponent);

        if exponential.is_finite() {
            exponential.min(self.config.max_delay_seconds)
        } else {
            self.config.max_delay_seconds
        }
    }

    fn apply_jitter(&self, delay_seconds: f64) -> f64 {
        let jitter_range = delay_seconds * self.config.max_jitter;
        if jitter_range <= 0.0 {
            return delay_seconds;
        }

        // Uniform in [-range, range)
        let jitter = (fastrand::f64() * 2.0 - 1.0) * jitter_range;
        delay_seconds + jitter
    }
}

/// Seconds to `Duration`, clamped into `[0, max_seconds]`; never panics
fn clamp_to_duration(seconds: f64, max_seconds: f64) -> Duration {
    let cap = Duration::from_secs_f64(system::MAX_BACKOFF_DELAY_SECONDS);
    let ceiling = Duration::try_from_secs_f64(max_seconds)
        .unwrap_or(cap)
        .min(cap);
    if seconds.is_nan() {
        return ceiling;
    }
    Duration::try_from_secs_f64(seconds.max(0.0))
        .unwrap_or(ceiling)
        .min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(jitter_enabled: bool) -> BackoffCalculator {
        BackoffCalculator::new(BackoffConfig {
            base_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            multiplier: 2.0,
            jitter_enabled,
            max_jitter: 0.1,
        })
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let calc = calculator(false);
        assert_eq!(calc.delay_for(1), Duration::from_secs(1));
        assert_eq!(calc.delay_for(2), Duration::from_secs(2));
        assert_eq!(calc.delay_for(4), Duration::from_secs(8));
        assert_eq!(calc.delay_for(10), Duration::from_secs(60));
        assert_eq!(calc.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let calc = calculator(true);
        for _ in 0..100 {
            let delay = calc.delay_for(4).as_secs_f64();
            assert!((7.19..=8.81).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_oversized_schedule_clamps_instead_of_panicking() {
        let calc = BackoffCalculator::new(BackoffConfig {
            base_delay_seconds: 1.0,
            max_delay_seconds: 1e30,
            multiplier: 10.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        });
        assert_eq!(
            calc.delay_for(40),
            Duration::from_secs_f64(system::MAX_BACKOFF_DELAY_SECONDS)
        );
        assert!(calc.delay_for(1) <= Duration::from_millis(1100));
    }
}
