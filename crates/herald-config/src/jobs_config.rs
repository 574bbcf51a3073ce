//! Job queue configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the in-process job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker pool sizes per priority tier.
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Default maximum execution attempts per job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Default job execution timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Retry backoff configuration.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Cleanup and statistics reconciliation.
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,

    /// Graceful shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Per-job-type rate limits, keyed by job type.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: WorkerConfig::default(),
            max_attempts: default_max_attempts(),
            job_timeout_secs: default_job_timeout(),
            backoff: BackoffConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            shutdown: ShutdownConfig::default(),
            rate_limits: HashMap::new(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

impl JobsConfig {
    /// Returns the default job timeout as Duration.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Adds a rate limit for a job type.
    #[must_use]
    pub fn with_rate_limit(mut self, job_type: impl Into<String>, limit: RateLimitConfig) -> Self {
        self.rate_limits.insert(job_type.into(), limit);
        self
    }
}

/// Worker pool sizes and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Workers serving the urgent tier.
    #[serde(default = "default_urgent_workers")]
    pub urgent: usize,

    /// Workers serving the high tier.
    #[serde(default = "default_high_workers")]
    pub high: usize,

    /// Workers serving the normal tier.
    #[serde(default = "default_normal_workers")]
    pub normal: usize,

    /// Workers serving the low tier.
    #[serde(default = "default_low_workers")]
    pub low: usize,

    /// Idle poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            urgent: default_urgent_workers(),
            high: default_high_workers(),
            normal: default_normal_workers(),
            low: default_low_workers(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_urgent_workers() -> usize {
    5
}

fn default_high_workers() -> usize {
    3
}

fn default_normal_workers() -> usize {
    2
}

fn default_low_workers() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    100 // 100ms
}

impl WorkerConfig {
    /// Returns poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total number of workers across all tiers.
    pub fn total(&self) -> usize {
        self.urgent + self.high + self.normal + self.low
    }
}

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base_delay * attempts`.
    #[default]
    Linear,
    /// Constant `base_delay`.
    Fixed,
    /// `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`.
    Exponential,
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_base_delay() -> u64 {
    60_000 // 1 minute
}

fn default_max_delay() -> u64 {
    3_600_000 // 1 hour
}

fn default_multiplier() -> f64 {
    2.0
}

/// Housekeeping intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Interval between cleanup passes in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// How long terminal jobs are retained, in seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Interval between statistics reconciliation passes in seconds.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            retention_secs: default_retention(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_retention() -> u64 {
    86400 // 24 hours
}

fn default_stats_interval() -> u64 {
    30
}

impl HousekeepingConfig {
    /// Returns cleanup interval as Duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Returns retention window as Duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Returns stats reconciliation interval as Duration.
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight jobs, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,

    /// Interval between in-flight checks, in milliseconds.
    #[serde(default = "default_drain_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout(),
            poll_interval_ms: default_drain_poll_interval(),
        }
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_drain_poll_interval() -> u64 {
    1000
}

impl ShutdownConfig {
    /// Returns shutdown timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns drain poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Rate limiting strategy for a job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// Bucket refilled to `max_tokens` once per `refill_interval`.
    #[default]
    FixedWindow,
    /// Smooth GCRA quota of `max_tokens` per `refill_interval`.
    Gcra,
}

/// Rate limit for a single job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions allowed per refill interval.
    pub max_tokens: u32,

    /// Refill interval in milliseconds.
    #[serde(default = "default_refill_interval")]
    pub refill_interval_ms: u64,

    /// Limiting strategy.
    #[serde(default)]
    pub strategy: RateLimitStrategy,
}

fn default_refill_interval() -> u64 {
    60_000 // 1 minute
}

impl RateLimitConfig {
    /// Creates a fixed-window limit.
    pub fn new(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            max_tokens,
            refill_interval_ms: u64::try_from(refill_interval.as_millis()).unwrap_or(u64::MAX),
            strategy: RateLimitStrategy::FixedWindow,
        }
    }

    /// Creates a limit of `max_tokens` per minute.
    pub fn per_minute(max_tokens: u32) -> Self {
        Self::new(max_tokens, Duration::from_secs(60))
    }

    /// Switches to the GCRA strategy.
    #[must_use]
    pub fn gcra(mut self) -> Self {
        self.strategy = RateLimitStrategy::Gcra;
        self
    }

    /// Returns refill interval as Duration.
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}
