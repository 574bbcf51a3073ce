//! Priority tier queues.
//!
//! Each tier owns one lock guarding three disjoint sets: jobs waiting in the
//! queue, jobs held by a worker, and finished jobs kept for polling until
//! cleanup. Every transition between the sets happens under that lock, so a
//! job is never visible in two places at once.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobStatus, Priority};
use chrono::{DateTime, Utc};
use herald_core::JobId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,

    /// Only jobs of this type.
    pub job_type: Option<String>,

    /// Maximum number of jobs returned.
    pub limit: Option<usize>,
}

impl JobFilter {
    /// Matches every job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a status.
    #[must_use]
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to a job type.
    #[must_use]
    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self
                .job_type
                .as_deref()
                .map_or(true, |job_type| job.job_type == job_type)
    }
}

#[derive(Default)]
struct TierState {
    queued: VecDeque<Job>,
    active: HashMap<JobId, Job>,
    finished: HashMap<JobId, Job>,
}

impl TierState {
    fn find(&self, id: &JobId) -> Option<&Job> {
        self.queued
            .iter()
            .find(|job| job.id == *id)
            .or_else(|| self.active.get(id))
            .or_else(|| self.finished.get(id))
    }
}

#[derive(Default)]
struct Tier {
    state: Mutex<TierState>,
    notify: Notify,
}

/// The four priority queues.
#[derive(Default)]
pub struct PriorityQueues {
    tiers: [Tier; 4],
}

impl PriorityQueues {
    /// Creates empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, priority: Priority) -> &Tier {
        &self.tiers[priority.index()]
    }

    /// Appends a job to its tier and wakes one idle worker.
    pub fn push(&self, job: Job) {
        let tier = self.tier(job.priority);
        tier.state.lock().queued.push_back(job);
        tier.notify.notify_one();
    }

    /// Claims the first eligible job of the tier.
    ///
    /// The job leaves the queue and is marked `Processing` before the lock is
    /// released. `on_claim` runs under the same lock, so bookkeeping it does
    /// is never observed lagging behind the claim.
    pub fn claim(
        &self,
        priority: Priority,
        now: DateTime<Utc>,
        on_claim: impl FnOnce(&Job),
    ) -> Option<Job> {
        let mut state = self.tier(priority).state.lock();

        let position = state
            .queued
            .iter()
            .position(|job| job.status.is_claimable() && job.is_due(now))?;
        let mut job = state.queued.remove(position)?;

        job.mark_processing(now);
        on_claim(&job);
        state.active.insert(job.id, job.clone());
        Some(job)
    }

    /// Refreshes the snapshot of a job a worker is holding.
    pub fn update_active(&self, job: &Job) {
        let mut state = self.tier(job.priority).state.lock();
        if let Some(slot) = state.active.get_mut(&job.id) {
            slot.clone_from(job);
        }
    }

    /// Records a terminal job handed back by its worker.
    pub fn finish(&self, job: Job) {
        debug_assert!(job.is_terminal());
        let mut state = self.tier(job.priority).state.lock();
        state.active.remove(&job.id);
        state.finished.insert(job.id, job);
    }

    /// Puts a job handed back by its worker at the back of its tier.
    pub fn requeue(&self, job: Job) {
        let tier = self.tier(job.priority);
        {
            let mut state = tier.state.lock();
            state.active.remove(&job.id);
            state.queued.push_back(job);
        }
        tier.notify.notify_one();
    }

    /// Cancels a queued job that is still `Pending`.
    pub fn cancel(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<Job> {
        for tier in &self.tiers {
            let mut state = tier.state.lock();

            if let Some(position) = state.queued.iter().position(|job| job.id == *id) {
                let status = state.queued[position].status;
                if status != JobStatus::Pending {
                    return Err(JobError::NotCancellable { job_id: *id, status });
                }

                let Some(mut job) = state.queued.remove(position) else {
                    continue;
                };
                job.cancel(now);
                state.finished.insert(job.id, job.clone());
                return Ok(job);
            }

            if let Some(job) = state.active.get(id).or_else(|| state.finished.get(id)) {
                return Err(JobError::NotCancellable {
                    job_id: *id,
                    status: job.status,
                });
            }
        }

        Err(JobError::NotFound(*id))
    }

    /// Returns a snapshot of a job.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.tiers
            .iter()
            .find_map(|tier| tier.state.lock().find(id).cloned())
    }

    /// Lists jobs matching the filter, highest tier first, oldest first
    /// within a tier.
    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut jobs = Vec::new();

        for priority in Priority::ALL {
            if jobs.len() >= limit {
                break;
            }

            let mut tier_jobs: Vec<Job> = {
                let state = self.tier(priority).state.lock();
                state
                    .queued
                    .iter()
                    .chain(state.active.values())
                    .chain(state.finished.values())
                    .filter(|job| filter.matches(job))
                    .cloned()
                    .collect()
            };
            tier_jobs.sort_by_key(|job| (job.created_at, job.id));
            jobs.extend(tier_jobs.into_iter().take(limit - jobs.len()));
        }

        jobs
    }

    /// Removes terminal jobs that finished before `cutoff`.
    pub fn evict_finished(&self, cutoff: DateTime<Utc>) -> usize {
        self.tiers
            .iter()
            .map(|tier| {
                let mut state = tier.state.lock();
                let before = state.finished.len();
                state
                    .finished
                    .retain(|_, job| job.completed_at.map_or(true, |at| at >= cutoff));
                before - state.finished.len()
            })
            .sum()
    }

    /// Number of jobs waiting in the tier's queue.
    pub fn queued_len(&self, priority: Priority) -> usize {
        self.tier(priority).state.lock().queued.len()
    }

    /// Number of jobs held by the tier's workers.
    pub fn active_len(&self, priority: Priority) -> usize {
        self.tier(priority).state.lock().active.len()
    }

    /// Resolves when a job is pushed to the tier.
    pub fn notified(&self, priority: Priority) -> Notified<'_> {
        self.tier(priority).notify.notified()
    }
}

impl std::fmt::Debug for PriorityQueues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("PriorityQueues");
        for priority in Priority::ALL {
            out.field(priority.as_str(), &self.queued_len(priority));
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, Payload};
    use crate::stats::StatsCollector;
    use std::time::Duration;

    fn job(job_type: &str, priority: Priority) -> Job {
        JobRequest::new(job_type, Payload::new())
            .priority(priority)
            .build(3, Duration::from_secs(60))
    }

    #[test]
    fn test_claim_is_fifo_within_tier() {
        let queues = PriorityQueues::new();
        let first = job("echo", Priority::Normal);
        let second = job("echo", Priority::Normal);
        queues.push(first.clone());
        queues.push(second.clone());

        let now = Utc::now();
        assert_eq!(queues.claim(Priority::Normal, now, |_| {}).unwrap().id, first.id);
        assert_eq!(queues.claim(Priority::Normal, now, |_| {}).unwrap().id, second.id);
        assert!(queues.claim(Priority::Normal, now, |_| {}).is_none());
    }

    #[test]
    fn test_tiers_are_independent() {
        let queues = PriorityQueues::new();
        queues.push(job("echo", Priority::Low));

        let now = Utc::now();
        assert!(queues.claim(Priority::Urgent, now, |_| {}).is_none());
        assert!(queues.claim(Priority::Low, now, |_| {}).is_some());
    }

    #[test]
    fn test_claim_skips_jobs_not_yet_due() {
        let queues = PriorityQueues::new();
        let later = JobRequest::new("echo", Payload::new())
            .delay(Duration::from_secs(3600))
            .build(3, Duration::from_secs(60));
        let now_job = job("echo", Priority::Normal);
        queues.push(later.clone());
        queues.push(now_job.clone());

        let claimed = queues.claim(Priority::Normal, Utc::now(), |_| {}).unwrap();
        assert_eq!(claimed.id, now_job.id);
        assert!(queues.claim(Priority::Normal, Utc::now(), |_| {}).is_none());
        assert_eq!(queues.queued_len(Priority::Normal), 1);
    }

    #[test]
    fn test_claim_bookkeeping_runs_under_tier_lock() {
        let queues = PriorityQueues::new();
        let stats = StatsCollector::new();
        let pending = job("echo", Priority::Urgent);
        stats.record_submitted(&pending);
        queues.push(pending.clone());

        let claimed = queues.claim(Priority::Urgent, Utc::now(), |job| {
            assert!(queues.tier(Priority::Urgent).state.try_lock().is_none());
            assert_eq!(job.status, JobStatus::Processing);
            stats.record_claimed(job.priority);
        });

        assert_eq!(claimed.unwrap().id, pending.id);
        assert_eq!(stats.in_flight(), 1);
        assert_eq!(stats.snapshot().pending(Priority::Urgent), 0);

        let mut called = false;
        assert!(queues.claim(Priority::Urgent, Utc::now(), |_| called = true).is_none());
        assert!(!called);
        assert_eq!(stats.in_flight(), 1);
    }

    #[test]
    fn test_claim_moves_job_out_of_queue() {
        let queues = PriorityQueues::new();
        let pending = job("echo", Priority::High);
        queues.push(pending.clone());

        let claimed = queues.claim(Priority::High, Utc::now(), |_| {}).unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());
        assert_eq!(queues.queued_len(Priority::High), 0);
        assert_eq!(queues.active_len(Priority::High), 1);
        assert_eq!(queues.get(&pending.id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_finish_and_requeue() {
        let queues = PriorityQueues::new();
        queues.push(job("echo", Priority::Normal));
        let mut claimed = queues.claim(Priority::Normal, Utc::now(), |_| {}).unwrap();

        claimed.begin_attempt();
        claimed.schedule_retry(&JobError::failed("boom"), Utc::now());
        queues.requeue(claimed.clone());
        assert_eq!(queues.active_len(Priority::Normal), 0);
        assert_eq!(queues.queued_len(Priority::Normal), 1);

        let mut again = queues.claim(Priority::Normal, Utc::now(), |_| {}).unwrap();
        assert_eq!(again.attempts, 1);
        again.complete(None, Utc::now());
        queues.finish(again);
        assert_eq!(queues.active_len(Priority::Normal), 0);
        assert_eq!(queues.get(&claimed.id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_cancel_pending_only() {
        let queues = PriorityQueues::new();
        let pending = job("echo", Priority::Normal);
        queues.push(pending.clone());

        let cancelled = queues.cancel(&pending.id, Utc::now()).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(queues.queued_len(Priority::Normal), 0);

        let err = queues.cancel(&pending.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobError::NotCancellable { status: JobStatus::Cancelled, .. }
        ));
    }

    #[test]
    fn test_cancel_rejects_processing_and_retrying() {
        let queues = PriorityQueues::new();
        let first = job("echo", Priority::Urgent);
        queues.push(first.clone());
        let mut claimed = queues.claim(Priority::Urgent, Utc::now(), |_| {}).unwrap();

        let err = queues.cancel(&first.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobError::NotCancellable { status: JobStatus::Processing, .. }
        ));

        claimed.begin_attempt();
        claimed.schedule_retry(&JobError::failed("boom"), Utc::now());
        queues.requeue(claimed);
        let err = queues.cancel(&first.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobError::NotCancellable { status: JobStatus::Retrying, .. }
        ));
        assert_eq!(queues.get(&first.id).unwrap().status, JobStatus::Retrying);
    }

    #[test]
    fn test_cancel_unknown() {
        let queues = PriorityQueues::new();
        let id = JobId::new();
        assert!(matches!(queues.cancel(&id, Utc::now()), Err(JobError::NotFound(found)) if found == id));
    }

    #[test]
    fn test_list_orders_tiers_and_applies_filter() {
        let queues = PriorityQueues::new();
        let low = job("echo", Priority::Low);
        let urgent = job("echo", Priority::Urgent);
        let other = job("backup", Priority::High);
        queues.push(low.clone());
        queues.push(urgent.clone());
        queues.push(other.clone());

        let all = queues.list(&JobFilter::new());
        let ids: Vec<JobId> = all.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![urgent.id, other.id, low.id]);

        let echoes = queues.list(&JobFilter::new().job_type("echo"));
        assert_eq!(echoes.len(), 2);

        let limited = queues.list(&JobFilter::new().limit(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, urgent.id);

        let completed = queues.list(&JobFilter::new().status(JobStatus::Completed));
        assert!(completed.is_empty());
    }

    #[test]
    fn test_evict_finished() {
        let queues = PriorityQueues::new();
        queues.push(job("echo", Priority::Normal));
        queues.push(job("echo", Priority::Normal));

        let old_time = Utc::now() - chrono::Duration::hours(25);
        let mut old = queues.claim(Priority::Normal, Utc::now(), |_| {}).unwrap();
        old.complete(None, old_time);
        queues.finish(old.clone());

        let mut recent = queues.claim(Priority::Normal, Utc::now(), |_| {}).unwrap();
        recent.fail(&JobError::failed("boom"), Utc::now());
        queues.finish(recent.clone());

        let evicted = queues.evict_finished(Utc::now() - chrono::Duration::hours(24));
        assert_eq!(evicted, 1);
        assert!(queues.get(&old.id).is_none());
        assert!(queues.get(&recent.id).is_some());
    }

    #[tokio::test]
    async fn test_push_notifies_waiter() {
        let queues = std::sync::Arc::new(PriorityQueues::new());
        let waiter = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.notified(Priority::High).await })
        };
        tokio::task::yield_now().await;
        queues.push(job("echo", Priority::High));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be notified")
            .unwrap();
    }
}
