//! Job error types.

use crate::job::JobStatus;
use herald_core::{HeraldError, JobId};
use std::time::Duration;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Admission rejected by the job type's rate limiter.
    #[error("rate limit exceeded for job type: {job_type}")]
    RateLimited { job_type: String },

    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Job is not in a cancellable state.
    #[error("job {job_id} is not cancellable (status: {status})")]
    NotCancellable { job_id: JobId, status: JobStatus },

    /// No handler registered for the job type.
    #[error("no handler registered for job type: {0}")]
    NoHandler(String),

    /// Job execution failed.
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),

    /// Job timed out.
    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    /// Handler panicked.
    #[error("job handler panicked: {0}")]
    Panicked(String),

    /// Handler observed cancellation and gave up.
    #[error("job was cancelled")]
    Cancelled,

    /// The payload is missing or malformed for the handler.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Worker error.
    #[error("worker error: {0}")]
    Worker(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Creates an execution failure, the usual error for handlers to return.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::ExecutionFailed(message.into())
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::RateLimited { .. } => "rate_limited",
            JobError::NotFound(_) => "not_found",
            JobError::NotCancellable { .. } => "not_cancellable",
            JobError::NoHandler(_) => "no_handler",
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::Timeout(_) => "timeout",
            JobError::Panicked(_) => "panicked",
            JobError::Cancelled => "cancelled",
            JobError::InvalidPayload(_) => "invalid_payload",
            JobError::Worker(_) => "worker",
            JobError::Configuration(_) => "configuration",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<HeraldError> for JobError {
    fn from(err: HeraldError) -> Self {
        match err {
            HeraldError::Configuration(msg) => JobError::Configuration(msg),
            other => JobError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_handler_message() {
        let err = JobError::NoHandler("send_message".into());
        assert_eq!(
            err.to_string(),
            "no handler registered for job type: send_message"
        );
        assert_eq!(err.kind(), "no_handler");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(JobError::failed("oops").kind(), "execution_failed");
        assert_eq!(JobError::Timeout(Duration::from_secs(30)).kind(), "timeout");
        assert_eq!(JobError::Panicked("boom".into()).kind(), "panicked");
        assert_eq!(
            JobError::InvalidPayload("missing field".into()).kind(),
            "invalid_payload"
        );
    }

    #[test]
    fn test_not_cancellable_display() {
        let id = JobId::new();
        let err = JobError::NotCancellable {
            job_id: id,
            status: JobStatus::Processing,
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()) && msg.contains("processing"));
    }

    #[test]
    fn test_from_herald_error() {
        let err = JobError::from(HeraldError::configuration("missing key"));
        assert!(matches!(err, JobError::Configuration(msg) if msg == "missing key"));

        let err = JobError::from(HeraldError::telemetry("subscriber already set"));
        assert!(matches!(err, JobError::Internal(msg) if msg.contains("subscriber already set")));
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let err = JobError::from(serde_err);
        assert_eq!(err.kind(), "invalid_payload");
    }
}
