//! Prometheus-style metrics.
//!
//! Lifecycle transitions share one counter, `herald_job_events_total`,
//! labelled by `event` and `job_type`. The host installs a recorder; until
//! then every call here is a no-op.

use crate::job::Priority;
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

pub mod names {
    pub const JOB_EVENTS: &str = "herald_job_events_total";
    pub const JOB_FAILURES: &str = "herald_job_failures_total";
    pub const JOBS_EVICTED: &str = "herald_jobs_evicted_total";

    pub const QUEUE_DEPTH: &str = "herald_queue_depth";
    pub const IN_FLIGHT: &str = "herald_jobs_in_flight";
    pub const TIER_WORKERS: &str = "herald_tier_workers";

    pub const ATTEMPT_SECONDS: &str = "herald_attempt_duration_seconds";
    pub const CLAIM_DELAY_SECONDS: &str = "herald_claim_delay_seconds";
}

/// A lifecycle transition counted under [`names::JOB_EVENTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Submitted,
    Rejected,
    Claimed,
    Completed,
    Retried,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobEvent::Submitted => "submitted",
            JobEvent::Rejected => "rejected",
            JobEvent::Claimed => "claimed",
            JobEvent::Completed => "completed",
            JobEvent::Retried => "retried",
            JobEvent::Failed => "failed",
            JobEvent::Cancelled => "cancelled",
            JobEvent::TimedOut => "timed_out",
        }
    }
}

/// Describes every metric to the installed recorder. Call once at startup.
pub fn register_metrics() {
    describe_counter!(
        names::JOB_EVENTS,
        "Job lifecycle transitions, labelled by event and job type"
    );
    describe_counter!(
        names::JOB_FAILURES,
        "Terminal job failures, labelled by error kind"
    );
    describe_counter!(names::JOBS_EVICTED, "Finished jobs dropped by cleanup");

    describe_gauge!(names::QUEUE_DEPTH, "Jobs queued per tier, including retries");
    describe_gauge!(names::IN_FLIGHT, "Jobs currently held by a worker");
    describe_gauge!(names::TIER_WORKERS, "Workers started per tier");

    describe_histogram!(
        names::ATTEMPT_SECONDS,
        "Wall time of one handler attempt, labelled by outcome"
    );
    describe_histogram!(
        names::CLAIM_DELAY_SECONDS,
        "Delay between a job becoming due and a worker claiming it"
    );
}

/// Stateless facade over the `metrics` macros.
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn event(event: JobEvent, job_type: &str) {
        counter!(
            names::JOB_EVENTS,
            "event" => event.as_str(),
            "job_type" => job_type.to_owned()
        )
        .increment(1);
    }

    /// Counts a terminal failure and its error kind.
    pub fn failure(job_type: &str, kind: &'static str) {
        Self::event(JobEvent::Failed, job_type);
        counter!(
            names::JOB_FAILURES,
            "job_type" => job_type.to_owned(),
            "error" => kind
        )
        .increment(1);
    }

    /// Records how long one attempt ran. `outcome` is `ok`, `retry` or `failed`.
    pub fn attempt(job_type: &str, outcome: &'static str, elapsed: Duration) {
        histogram!(
            names::ATTEMPT_SECONDS,
            "job_type" => job_type.to_owned(),
            "outcome" => outcome
        )
        .record(elapsed.as_secs_f64());
    }

    pub fn claim_delay(priority: Priority, delay: Duration) {
        histogram!(names::CLAIM_DELAY_SECONDS, "priority" => priority.as_str())
            .record(delay.as_secs_f64());
    }

    pub fn evicted(count: usize) {
        counter!(names::JOBS_EVICTED).increment(count as u64);
    }

    pub fn queue_depth(priority: Priority, depth: u64) {
        gauge!(names::QUEUE_DEPTH, "priority" => priority.as_str()).set(depth as f64);
    }

    pub fn in_flight(count: u64) {
        gauge!(names::IN_FLIGHT).set(count as f64);
    }

    pub fn tier_workers(priority: Priority, workers: usize) {
        gauge!(names::TIER_WORKERS, "priority" => priority.as_str()).set(workers as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_labels_are_distinct() {
        let events = [
            JobEvent::Submitted,
            JobEvent::Rejected,
            JobEvent::Claimed,
            JobEvent::Completed,
            JobEvent::Retried,
            JobEvent::Failed,
            JobEvent::Cancelled,
            JobEvent::TimedOut,
        ];
        let labels: std::collections::HashSet<_> = events.iter().map(|e| e.as_str()).collect();
        assert_eq!(labels.len(), events.len());
    }

    #[test]
    fn test_calls_without_recorder_are_noops() {
        register_metrics();
        QueueMetrics::event(JobEvent::Submitted, "echo");
        QueueMetrics::claim_delay(Priority::Normal, Duration::from_millis(5));
        QueueMetrics::attempt("echo", "ok", Duration::from_millis(20));
        QueueMetrics::failure("echo", "timeout");
        QueueMetrics::queue_depth(Priority::Urgent, 3);
        QueueMetrics::tier_workers(Priority::Low, 1);
    }
}
