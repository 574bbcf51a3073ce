//! Queue statistics.

use crate::job::{Job, Priority};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Snapshot of the queue's running counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs admitted since startup.
    pub total_jobs: u64,

    /// Jobs that completed.
    pub completed_jobs: u64,

    /// Jobs that failed permanently.
    pub failed_jobs: u64,

    /// Jobs cancelled while pending.
    pub cancelled_jobs: u64,

    /// Attempts that were rescheduled after a failure.
    pub retried_jobs: u64,

    /// Submissions refused by a rate limiter.
    pub rejected_jobs: u64,

    /// Jobs currently held by workers.
    pub in_flight: u64,

    /// Jobs waiting in each tier, including those waiting out a backoff.
    pub pending_by_priority: BTreeMap<Priority, u64>,

    /// Jobs admitted per type.
    pub jobs_by_type: HashMap<String, u64>,

    /// Running average of successful execution time per type.
    pub average_duration_ms: HashMap<String, f64>,

    /// When any counter last changed.
    pub last_updated: DateTime<Utc>,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
            retried_jobs: 0,
            rejected_jobs: 0,
            in_flight: 0,
            pending_by_priority: Priority::ALL.iter().map(|p| (*p, 0)).collect(),
            jobs_by_type: HashMap::new(),
            average_duration_ms: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl QueueStats {
    /// Jobs waiting across all tiers.
    pub fn pending_total(&self) -> u64 {
        self.pending_by_priority.values().sum()
    }

    /// Jobs waiting in one tier.
    pub fn pending(&self, priority: Priority) -> u64 {
        self.pending_by_priority.get(&priority).copied().unwrap_or(0)
    }

    fn pending_mut(&mut self, priority: Priority) -> &mut u64 {
        self.pending_by_priority.entry(priority).or_insert(0)
    }
}

/// Mutable statistics shared by the queue and its workers.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<QueueStats>,
}

impl StatsCollector {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut QueueStats)) {
        let mut stats = self.inner.lock();
        f(&mut stats);
        stats.last_updated = Utc::now();
    }

    /// A job was admitted.
    pub fn record_submitted(&self, job: &Job) {
        self.update(|stats| {
            stats.total_jobs += 1;
            *stats.pending_mut(job.priority) += 1;
            *stats.jobs_by_type.entry(job.job_type.clone()).or_insert(0) += 1;
        });
    }

    /// A submission was refused.
    pub fn record_rejected(&self) {
        self.update(|stats| stats.rejected_jobs += 1);
    }

    /// A worker took a job off its tier.
    pub fn record_claimed(&self, priority: Priority) {
        self.update(|stats| {
            let pending = stats.pending_mut(priority);
            *pending = pending.saturating_sub(1);
            stats.in_flight += 1;
        });
    }

    /// A job completed after running for `duration`.
    ///
    /// Later samples fold in as `avg = (avg + d) / 2`. The first sample for a
    /// type seeds the average directly; the reference formula starts from
    /// zero, which would halve the first reading.
    pub fn record_completed(&self, job_type: &str, duration: Duration) {
        let sample = duration.as_secs_f64() * 1000.0;
        self.update(|stats| {
            stats.completed_jobs += 1;
            stats
                .average_duration_ms
                .entry(job_type.to_string())
                .and_modify(|avg| *avg = (*avg + sample) / 2.0)
                .or_insert(sample);
        });
    }

    /// A job failed permanently.
    pub fn record_failed(&self) {
        self.update(|stats| stats.failed_jobs += 1);
    }

    /// A failed attempt went back into its tier.
    pub fn record_retried(&self, priority: Priority) {
        self.update(|stats| {
            stats.retried_jobs += 1;
            *stats.pending_mut(priority) += 1;
        });
    }

    /// A pending job was cancelled.
    pub fn record_cancelled(&self, priority: Priority) {
        self.update(|stats| {
            stats.cancelled_jobs += 1;
            let pending = stats.pending_mut(priority);
            *pending = pending.saturating_sub(1);
        });
    }

    /// A worker handed its job back.
    pub fn release(&self) {
        self.update(|stats| stats.in_flight = stats.in_flight.saturating_sub(1));
    }

    /// Replaces the pending counters with values counted from the queues.
    pub fn reconcile(&self, pending: BTreeMap<Priority, u64>) -> QueueStats {
        let mut stats = self.inner.lock();
        stats.pending_by_priority = pending;
        stats.last_updated = Utc::now();
        stats.clone()
    }

    /// Jobs currently held by workers.
    pub fn in_flight(&self) -> u64 {
        self.inner.lock().in_flight
    }

    /// Copy of the current statistics.
    pub fn snapshot(&self) -> QueueStats {
        self.inner.lock().clone()
    }
}
