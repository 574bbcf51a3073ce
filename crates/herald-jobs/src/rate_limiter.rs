//! Per-job-type admission rate limiting.
//!
//! The default strategy is a coarse token bucket that refills to capacity
//! once a full refill interval has passed since the last refill. The `gcra`
//! strategy delegates to `governor` for a smooth quota.

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use herald_config::{RateLimitConfig, RateLimitStrategy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Token bucket refilled in full once per interval.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u32,
    max_tokens: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_interval,
            last_refill: Instant::now(),
        }
    }

    /// Takes one token at `now`, refilling first if the interval has elapsed.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_refill) >= self.refill_interval {
            self.tokens = self.max_tokens;
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Takes one token now.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Tokens left in the current interval.
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Bucket capacity.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

enum Limiter {
    FixedWindow(TokenBucket),
    Gcra(DirectLimiter),
}

impl Limiter {
    fn from_config(config: &RateLimitConfig) -> Self {
        match config.strategy {
            RateLimitStrategy::FixedWindow => {
                Limiter::FixedWindow(TokenBucket::new(config.max_tokens, config.refill_interval()))
            }
            RateLimitStrategy::Gcra => match gcra_quota(config) {
                Some(quota) => Limiter::Gcra(GovernorRateLimiter::direct(quota)),
                // Zero tokens or a zero interval: fall back to a bucket that
                // behaves the same way.
                None => Limiter::FixedWindow(TokenBucket::new(
                    config.max_tokens,
                    config.refill_interval(),
                )),
            },
        }
    }

    fn try_acquire(&mut self) -> bool {
        match self {
            Limiter::FixedWindow(bucket) => bucket.try_acquire(),
            Limiter::Gcra(limiter) => limiter.check().is_ok(),
        }
    }
}

fn gcra_quota(config: &RateLimitConfig) -> Option<Quota> {
    let burst = NonZeroU32::new(config.max_tokens)?;
    let period = config.refill_interval() / burst.get();
    Quota::with_period(period).map(|quota| quota.allow_burst(burst))
}

/// Rate limiters keyed by job type.
///
/// Job types without a limiter are always admitted.
#[derive(Default)]
pub struct RateLimiter {
    limiters: Mutex<HashMap<String, Limiter>>,
}

impl RateLimiter {
    /// Creates a rate limiter with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates limiters for every configured job type.
    pub fn from_config(limits: &HashMap<String, RateLimitConfig>) -> Self {
        let limiter = Self::new();
        for (job_type, config) in limits {
            limiter.set_limit(job_type.clone(), config);
        }
        limiter
    }

    /// Installs or replaces the limit for a job type.
    pub fn set_limit(&self, job_type: impl Into<String>, config: &RateLimitConfig) {
        let job_type = job_type.into();
        info!(
            job_type = %job_type,
            max_tokens = config.max_tokens,
            refill_interval_ms = config.refill_interval_ms,
            strategy = ?config.strategy,
            "Configured rate limit"
        );
        self.limiters
            .lock()
            .insert(job_type, Limiter::from_config(config));
    }

    /// Removes the limit for a job type.
    pub fn remove_limit(&self, job_type: &str) -> bool {
        self.limiters.lock().remove(job_type).is_some()
    }

    /// Returns true if a limit is configured for the job type.
    pub fn has_limit(&self, job_type: &str) -> bool {
        self.limiters.lock().contains_key(job_type)
    }

    /// Consumes one admission for the job type, returning false if none is left.
    pub fn try_acquire(&self, job_type: &str) -> bool {
        let mut limiters = self.limiters.lock();
        let Some(limiter) = limiters.get_mut(job_type) else {
            return true;
        };

        let admitted = limiter.try_acquire();
        if !admitted {
            debug!(job_type = %job_type, "Rate limit exhausted");
        }
        admitted
    }

    /// Tokens left for a fixed-window job type.
    pub fn remaining(&self, job_type: &str) -> Option<u32> {
        match self.limiters.lock().get(job_type)? {
            Limiter::FixedWindow(bucket) => Some(bucket.tokens()),
            Limiter::Gcra(_) => None,
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("job_types", &self.limiters.lock().len())
            .finish_non_exhaustive()
    }
}
