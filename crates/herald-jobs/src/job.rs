//! Job model: priorities, statuses, the job record, and submission requests.

use crate::error::JobError;
use chrono::{DateTime, Utc};
use herald_core::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Opaque key-value payload handed to handlers verbatim.
pub type Payload = serde_json::Map<String, Value>;

/// Job priority tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Important work.
    High,
    /// Time-sensitive work.
    Urgent,
}

impl Priority {
    /// All tiers, highest first.
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Stable index of the tier, `Low = 0` through `Urgent = 3`.
    pub const fn index(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }

    /// Lowercase name of the tier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(JobError::InvalidPayload(format!("unknown priority: {other}"))),
        }
    }
}

/// Job status.
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in its tier's queue.
    #[default]
    Pending,
    /// Held by a worker.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Attempts exhausted or not executable.
    Failed,
    /// Waiting in its tier's queue for a backoff to elapse.
    Retrying,
    /// Cancelled before any worker claimed it.
    Cancelled,
}

impl JobStatus {
    /// Returns true for statuses that never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true for statuses a worker may claim.
    pub const fn is_claimable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job ID.
    pub id: JobId,

    /// Job type, used to resolve a handler.
    #[serde(rename = "type")]
    pub job_type: String,

    /// Priority tier.
    pub priority: Priority,

    /// Current status.
    pub status: JobStatus,

    /// Handler input.
    pub payload: Payload,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Earliest time the job may run.
    pub scheduled_at: DateTime<Utc>,

    /// When the last attempt started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,

    /// Attempts made so far.
    pub attempts: u32,

    /// Attempt ceiling.
    pub max_attempts: u32,

    /// Per-attempt execution deadline.
    pub timeout: Duration,

    /// Last failure message.
    pub error: Option<String>,

    /// Value attached by the handler on success.
    pub result: Option<Value>,
}

impl Job {
    /// Returns true once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if `scheduled_at` has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    /// Returns true if no attempts remain.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub(crate) fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    pub(crate) fn complete(&mut self, result: Option<Value>, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = result;
        self.completed_at = Some(now);
    }

    pub(crate) fn fail(&mut self, error: &JobError, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(now);
    }

    pub(crate) fn schedule_retry(&mut self, error: &JobError, at: DateTime<Utc>) {
        self.status = JobStatus::Retrying;
        self.error = Some(error.to_string());
        self.scheduled_at = at.max(self.created_at);
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
    }
}

/// Builder for submitting jobs with options.
#[derive(Debug, Clone)]
pub struct JobRequest {
    job_type: String,
    payload: Payload,
    priority: Priority,
    delay: Option<Duration>,
    scheduled_at: Option<DateTime<Utc>>,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
}

impl JobRequest {
    /// Create a new request for the given job type.
    pub fn new(job_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: Priority::Normal,
            delay: None,
            scheduled_at: None,
            max_attempts: None,
            timeout: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set a delay before execution.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.scheduled_at = None;
        self
    }

    /// Schedule for a specific time.
    #[must_use]
    pub fn at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self.delay = None;
        self
    }

    /// Override the attempt ceiling.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Override the execution timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Job type of this request.
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Build the pending job.
    pub(crate) fn build(self, default_max_attempts: u32, default_timeout: Duration) -> Job {
        let now = Utc::now();

        let scheduled_at = match (self.scheduled_at, self.delay) {
            (Some(at), _) => at,
            (None, Some(delay)) => add_duration(now, delay),
            (None, None) => now,
        };

        Job {
            id: JobId::new(),
            job_type: self.job_type,
            priority: self.priority,
            status: JobStatus::Pending,
            payload: self.payload,
            created_at: now,
            scheduled_at: scheduled_at.max(now),
            started_at: None,
            completed_at: None,
            attempts: 0,
            max_attempts: self.max_attempts.unwrap_or(default_max_attempts),
            timeout: self.timeout.unwrap_or(default_timeout),
            error: None,
            result: None,
        }
    }
}

/// Context handed to a handler for one attempt.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Job type.
    pub job_type: String,

    /// Priority tier.
    pub priority: Priority,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed.
    pub max_attempts: u32,

    /// The attempt must finish before this instant.
    pub deadline: DateTime<Utc>,

    /// Worker ID processing this job.
    pub worker_id: String,

    cancellation: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(job: &Job, worker_id: &str, cancellation: CancellationToken) -> Self {
        let started_at = job.started_at.unwrap_or_else(Utc::now);
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            priority: job.priority,
            attempt: job.attempts,
            max_attempts: job.max_attempts,
            deadline: add_duration(started_at, job.timeout),
            worker_id: worker_id.to_string(),
            cancellation,
        }
    }

    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    /// Time left until the deadline.
    pub fn remaining_time(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or_default()
    }

    /// Returns true once the deadline has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the deadline is signalled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Token cancelled when the attempt's deadline passes.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

pub(crate) fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
