//! Dependency injection interface for the job queue.
//!
//! Lets hosts hold the queue as `Arc<dyn JobQueueInterface>`.

use crate::error::JobResult;
use crate::job::{Job, JobRequest};
use crate::queue::JobFilter;
use crate::registry::JobHandler;
use crate::service::{JobQueueService, ShutdownReport};
use crate::stats::QueueStats;
use async_trait::async_trait;
use herald_core::{Interface, JobId};
use std::sync::Arc;
use std::time::Duration;

/// Interface for job queue operations.
#[async_trait]
pub trait JobQueueInterface: Interface + Send + Sync {
    /// Submit a job.
    fn enqueue(&self, request: JobRequest) -> JobResult<Job>;

    /// Get job by ID.
    fn get_job(&self, job_id: &JobId) -> JobResult<Job>;

    /// List jobs matching a filter.
    fn list_jobs(&self, filter: &JobFilter) -> Vec<Job>;

    /// Get queue statistics.
    fn queue_stats(&self) -> QueueStats;

    /// Cancel a pending job.
    fn cancel_job(&self, job_id: &JobId) -> JobResult<Job>;

    /// Register the handler for a job type.
    fn register_handler(&self, job_type: &str, handler: Arc<dyn JobHandler>);

    /// Remove the handler for a job type.
    fn unregister_handler(&self, job_type: &str) -> bool;

    /// Start the worker pools.
    fn start(&self) -> JobResult<()>;

    /// Drain and stop the worker pools.
    async fn shutdown(&self, timeout: Duration) -> ShutdownReport;
}

#[async_trait]
impl JobQueueInterface for JobQueueService {
    fn enqueue(&self, request: JobRequest) -> JobResult<Job> {
        JobQueueService::enqueue(self, request)
    }

    fn get_job(&self, job_id: &JobId) -> JobResult<Job> {
        self.get(job_id)
    }

    fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        self.list(filter)
    }

    fn queue_stats(&self) -> QueueStats {
        self.stats()
    }

    fn cancel_job(&self, job_id: &JobId) -> JobResult<Job> {
        self.cancel(job_id)
    }

    fn register_handler(&self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.core.registry.register(job_type, handler);
    }

    fn unregister_handler(&self, job_type: &str) -> bool {
        JobQueueService::unregister_handler(self, job_type)
    }

    fn start(&self) -> JobResult<()> {
        JobQueueService::start(self)
    }

    async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        JobQueueService::shutdown(self, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobContext, Payload, Priority};
    use crate::registry::HandlerResult;
    use herald_config::JobsConfig;

    #[tokio::test]
    async fn test_service_behind_trait_object() {
        let queue: Arc<dyn JobQueueInterface> =
            Arc::new(JobQueueService::new(JobsConfig::default()).unwrap());

        queue.register_handler(
            "noop",
            Arc::new(|_ctx: JobContext, _job: Job| async move { HandlerResult::Ok(None) }),
        );

        let job = queue
            .enqueue(JobRequest::new("noop", Payload::new()).priority(Priority::Low))
            .unwrap();
        assert_eq!(queue.get_job(&job.id).unwrap().id, job.id);
        assert_eq!(queue.list_jobs(&JobFilter::new()).len(), 1);
        assert_eq!(queue.queue_stats().total_jobs, 1);

        queue.cancel_job(&job.id).unwrap();
        assert!(queue.unregister_handler("noop"));

        let report = queue.shutdown(Duration::from_millis(10)).await;
        assert!(report.drained);
    }
}
