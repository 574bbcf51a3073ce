//! Configuration validation module.
//!
//! Validates the whole configuration up front and reports every problem
//! found rather than stopping at the first one.

use crate::{AppConfig, BackoffStrategy, JobsConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// A priority tier has no workers, so its jobs would never run.
    NoWorkers { tier: &'static str },
    /// Jobs must be allowed at least one attempt.
    ZeroMaxAttempts,
    /// Timeout or interval value must be positive.
    NonPositiveInterval { name: String },
    /// A rate limit admits nothing.
    ZeroRateLimitTokens { job_type: String },
    /// A rate limit never refills.
    ZeroRefillInterval { job_type: String },
    /// Exponential backoff multiplier must be at least 1.0.
    InvalidMultiplier { value: f64 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkers { tier } => {
                write!(f, "Worker count for the {tier} tier must be at least 1")
            }
            Self::ZeroMaxAttempts => write!(f, "max_attempts must be at least 1"),
            Self::NonPositiveInterval { name } => {
                write!(f, "Interval '{name}' must be positive")
            }
            Self::ZeroRateLimitTokens { job_type } => {
                write!(f, "Rate limit for '{job_type}' must allow at least one token")
            }
            Self::ZeroRefillInterval { job_type } => {
                write!(f, "Rate limit for '{job_type}' needs a positive refill interval")
            }
            Self::InvalidMultiplier { value } => {
                write!(f, "Invalid backoff multiplier: {value} (must be >= 1.0)")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        Self::validate_jobs(&config.jobs)
    }

    /// Validates the job queue configuration.
    pub fn validate_jobs(config: &JobsConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        for (tier, count) in [
            ("urgent", config.workers.urgent),
            ("high", config.workers.high),
            ("normal", config.workers.normal),
            ("low", config.workers.low),
        ] {
            if count == 0 {
                errors.push(ConfigValidationError::NoWorkers { tier });
            }
        }

        if config.max_attempts == 0 {
            errors.push(ConfigValidationError::ZeroMaxAttempts);
        }

        for (name, value) in [
            ("job_timeout_secs", config.job_timeout_secs),
            ("workers.poll_interval_ms", config.workers.poll_interval_ms),
            (
                "housekeeping.cleanup_interval_secs",
                config.housekeeping.cleanup_interval_secs,
            ),
            (
                "housekeeping.stats_interval_secs",
                config.housekeeping.stats_interval_secs,
            ),
            ("shutdown.poll_interval_ms", config.shutdown.poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveInterval {
                    name: name.to_string(),
                });
            }
        }

        if config.backoff.strategy == BackoffStrategy::Exponential
            && config.backoff.multiplier < 1.0
        {
            errors.push(ConfigValidationError::InvalidMultiplier {
                value: config.backoff.multiplier,
            });
        }

        let mut job_types: Vec<&String> = config.rate_limits.keys().collect();
        job_types.sort();
        for job_type in job_types {
            let limit = &config.rate_limits[job_type];
            if limit.max_tokens == 0 {
                errors.push(ConfigValidationError::ZeroRateLimitTokens {
                    job_type: job_type.clone(),
                });
            }
            if limit.refill_interval_ms == 0 {
                errors.push(ConfigValidationError::ZeroRefillInterval {
                    job_type: job_type.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Joins validation errors into a single message.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RateLimitConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = JobsConfig::default();
        config.workers.low = 0;
        config.max_attempts = 0;
        config.shutdown.poll_interval_ms = 0;
        config
            .rate_limits
            .insert("bulk".into(), RateLimitConfig::new(0, std::time::Duration::ZERO));

        let errors = ConfigValidator::validate_jobs(&config).unwrap_err();
        assert!(errors.contains(&ConfigValidationError::NoWorkers { tier: "low" }));
        assert!(errors.contains(&ConfigValidationError::ZeroMaxAttempts));
        assert!(errors.contains(&ConfigValidationError::NonPositiveInterval {
            name: "shutdown.poll_interval_ms".into()
        }));
        assert!(errors.contains(&ConfigValidationError::ZeroRateLimitTokens {
            job_type: "bulk".into()
        }));
        assert!(errors.contains(&ConfigValidationError::ZeroRefillInterval {
            job_type: "bulk".into()
        }));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_exponential_multiplier() {
        let mut config = JobsConfig::default();
        config.backoff.multiplier = 0.5;
        // Ignored for linear backoff
        assert!(ConfigValidator::validate_jobs(&config).is_ok());

        config.backoff.strategy = BackoffStrategy::Exponential;
        let errors = ConfigValidator::validate_jobs(&config).unwrap_err();
        assert_eq!(errors, vec![ConfigValidationError::InvalidMultiplier { value: 0.5 }]);
    }

    #[test]
    fn test_format_validation_errors() {
        let msg = format_validation_errors(&[
            ConfigValidationError::ZeroMaxAttempts,
            ConfigValidationError::NoWorkers { tier: "high" },
        ]);
        assert!(msg.contains("max_attempts"));
        assert!(msg.contains("high tier"));
    }
}
