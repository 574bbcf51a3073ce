//! Backoff between retry attempts.

use crate::job::add_duration;
use chrono::{DateTime, Utc};
use herald_config::{BackoffConfig, BackoffStrategy};
use std::time::Duration;

/// Delay applied before a failed job becomes eligible again.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Base delay (the per-attempt step for linear backoff).
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Growth factor for exponential backoff.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::linear(Duration::from_secs(60))
    }
}

impl BackoffPolicy {
    /// `step * attempts`.
    pub fn linear(step: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base_delay: step,
            max_delay: Duration::from_secs(3600),
            multiplier: 1.0,
        }
    }

    /// Constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// `base * multiplier^(attempts - 1)`.
    pub fn exponential(base: Duration, multiplier: f64) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay: base,
            max_delay: Duration::from_secs(3600),
            multiplier,
        }
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Builds the policy from configuration.
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Delay after the given number of failed attempts.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempts),
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exp = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
                let factor = self.multiplier.powi(exp);
                Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
                    .unwrap_or(self.max_delay)
            }
        };

        delay.min(self.max_delay)
    }

    /// When a job that has failed `attempts` times may run again.
    pub fn next_run_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        add_duration(now, self.delay_for_attempt(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_linear_minutes() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(180));
    }

    #[test]
    fn test_from_default_config_matches_default() {
        let configured = BackoffPolicy::from_config(&BackoffConfig::default());
        let default = BackoffPolicy::default();
        assert_eq!(configured.strategy, BackoffStrategy::Linear);
        for attempt in 0..5 {
            assert_eq!(
                configured.delay_for_attempt(attempt),
                default.delay_for_attempt(attempt)
            );
        }
    }

    #[test]
    fn test_fixed() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_with_cap() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(1), 2.0)
            .with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_next_run_at() {
        let now = Utc::now();
        let policy = BackoffPolicy::linear(Duration::from_secs(60));
        assert_eq!(policy.next_run_at(2, now), now + chrono::Duration::minutes(2));
        assert_eq!(policy.next_run_at(0, now), now);
    }
}
