//! Job queue service.
//!
//! [`JobQueueService`] owns the tier queues, the handler registry, the rate
//! limiter and the statistics, and drives the worker pools and housekeeping
//! loops between [`start`](JobQueueService::start) and
//! [`shutdown`](JobQueueService::shutdown).

use crate::error::{JobError, JobResult};
use crate::housekeeping;
use crate::job::{Job, JobRequest, Payload, Priority};
use crate::metrics::{JobEvent, QueueMetrics};
use crate::queue::{JobFilter, PriorityQueues};
use crate::rate_limiter::RateLimiter;
use crate::registry::{HandlerRegistry, JobHandler};
use crate::retry::BackoffPolicy;
use crate::stats::{QueueStats, StatsCollector};
use crate::worker::Worker;
use chrono::{DateTime, Utc};
use herald_config::{format_validation_errors, ConfigValidator, JobsConfig, RateLimitConfig};
use herald_core::JobId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State shared between the service, its workers and housekeeping loops.
pub(crate) struct QueueCore {
    pub(crate) queues: PriorityQueues,
    pub(crate) registry: HandlerRegistry,
    pub(crate) stats: StatsCollector,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) poll_interval: Duration,
}

/// Outcome of a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True if every in-flight job finished before the timeout.
    pub drained: bool,

    /// Jobs still held by workers when the wait ended.
    pub in_flight: u64,

    /// Time spent waiting.
    pub waited: Duration,
}

/// In-process priority job queue.
pub struct JobQueueService {
    id: String,
    config: JobsConfig,
    pub(crate) core: Arc<QueueCore>,
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl JobQueueService {
    /// Creates a service from validated configuration.
    pub fn new(config: JobsConfig) -> JobResult<Self> {
        ConfigValidator::validate_jobs(&config)
            .map_err(|errors| JobError::Configuration(format_validation_errors(&errors)))?;

        let core = QueueCore {
            queues: PriorityQueues::new(),
            registry: HandlerRegistry::new(),
            stats: StatsCollector::new(),
            rate_limiter: RateLimiter::from_config(&config.rate_limits),
            backoff: BackoffPolicy::from_config(&config.backoff),
            poll_interval: config.workers.poll_interval(),
        };

        Ok(Self {
            id: format!("herald-jobs-{}", Uuid::new_v4()),
            config,
            core: Arc::new(core),
            shutdown: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Service instance ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration the service was built with.
    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submits a job to run as soon as a worker of its tier is free.
    pub fn submit(
        &self,
        job_type: impl Into<String>,
        payload: Payload,
        priority: Priority,
    ) -> JobResult<Job> {
        self.enqueue(JobRequest::new(job_type, payload).priority(priority))
    }

    /// Submits a job that becomes eligible at `at`.
    pub fn schedule(
        &self,
        job_type: impl Into<String>,
        payload: Payload,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> JobResult<Job> {
        self.enqueue(JobRequest::new(job_type, payload).priority(priority).at(at))
    }

    /// Submits a job built with [`JobRequest`].
    ///
    /// Fails with [`JobError::RateLimited`] if the job type's limiter has no
    /// tokens left; nothing is created in that case.
    pub fn enqueue(&self, request: JobRequest) -> JobResult<Job> {
        if !self.core.rate_limiter.try_acquire(request.job_type()) {
            let job_type = request.job_type().to_string();
            self.core.stats.record_rejected();
            QueueMetrics::event(JobEvent::Rejected, &job_type);
            warn!(job_type = %job_type, "Job rejected by rate limiter");
            return Err(JobError::RateLimited { job_type });
        }

        let job = request.build(self.config.max_attempts, self.config.job_timeout());
        self.core.stats.record_submitted(&job);
        QueueMetrics::event(JobEvent::Submitted, &job.job_type);
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            scheduled_at = %job.scheduled_at,
            "Job submitted"
        );

        self.core.queues.push(job.clone());
        Ok(job)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns a snapshot of a job.
    pub fn get(&self, job_id: &JobId) -> JobResult<Job> {
        self.core
            .queues
            .get(job_id)
            .ok_or(JobError::NotFound(*job_id))
    }

    /// Lists jobs, highest priority tier first.
    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        self.core.queues.list(filter)
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> QueueStats {
        self.core.stats.snapshot()
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Cancels a job that no worker has claimed yet.
    pub fn cancel(&self, job_id: &JobId) -> JobResult<Job> {
        let job = self.core.queues.cancel(job_id, Utc::now())?;
        self.core.stats.record_cancelled(job.priority);
        QueueMetrics::event(JobEvent::Cancelled, &job.job_type);
        info!(job_id = %job.id, job_type = %job.job_type, "Job cancelled");
        Ok(job)
    }

    /// Registers the handler for a job type, replacing any previous one.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: impl JobHandler) {
        self.core.registry.register(job_type, Arc::new(handler));
    }

    /// Removes the handler for a job type.
    pub fn unregister_handler(&self, job_type: &str) -> bool {
        self.core.registry.unregister(job_type)
    }

    /// Installs or replaces a fixed-window rate limit for a job type.
    pub fn set_rate_limit(
        &self,
        job_type: impl Into<String>,
        max_tokens: u32,
        refill_interval: Duration,
    ) -> JobResult<()> {
        self.set_rate_limit_config(job_type, &RateLimitConfig::new(max_tokens, refill_interval))
    }

    /// Installs or replaces a rate limit for a job type.
    pub fn set_rate_limit_config(
        &self,
        job_type: impl Into<String>,
        config: &RateLimitConfig,
    ) -> JobResult<()> {
        let job_type = job_type.into();
        if config.max_tokens == 0 || config.refill_interval_ms == 0 {
            return Err(JobError::Configuration(format!(
                "rate limit for '{job_type}' needs at least one token and a positive refill interval"
            )));
        }
        self.core.rate_limiter.set_limit(job_type, config);
        Ok(())
    }

    /// Removes the rate limit for a job type.
    pub fn remove_rate_limit(&self, job_type: &str) -> bool {
        self.core.rate_limiter.remove_limit(job_type)
    }

    /// Evicts finished jobs older than the retention window now.
    pub fn cleanup_now(&self) -> usize {
        housekeeping::cleanup(&self.core, self.config.housekeeping.retention())
    }

    /// Recounts pending jobs from the queues now.
    pub fn reconcile_stats(&self) -> QueueStats {
        housekeeping::reconcile(&self.core)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawns the worker pools and housekeeping loops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Worker("job queue already running".to_string()));
        }

        let token = {
            let mut shutdown = self.shutdown.lock();
            if shutdown.is_cancelled() {
                *shutdown = CancellationToken::new();
            }
            shutdown.clone()
        };

        let workers = &self.config.workers;
        info!(
            service_id = %self.id,
            urgent = workers.urgent,
            high = workers.high,
            normal = workers.normal,
            low = workers.low,
            "Starting job queue"
        );

        let mut tasks = self.tasks.lock();
        for (priority, count) in [
            (Priority::Urgent, workers.urgent),
            (Priority::High, workers.high),
            (Priority::Normal, workers.normal),
            (Priority::Low, workers.low),
        ] {
            QueueMetrics::tier_workers(priority, count);
            for index in 0..count {
                let worker_id = format!("{}-{}-{}", self.id, priority, index);
                let worker = Worker::new(worker_id, priority, self.core.clone(), token.clone());
                tasks.push(worker.spawn());
            }
        }

        let housekeeping_config = &self.config.housekeeping;
        tasks.push(housekeeping::spawn_cleanup(
            self.core.clone(),
            housekeeping_config.cleanup_interval(),
            housekeeping_config.retention(),
            token.clone(),
        ));
        tasks.push(housekeeping::spawn_reconcile(
            self.core.clone(),
            housekeeping_config.stats_interval(),
            token,
        ));

        Ok(())
    }

    /// Stops claiming new work and waits up to `timeout` for in-flight jobs.
    ///
    /// Workers finish their current job before exiting. Jobs still queued
    /// stay queued.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.shutdown.lock().cancel();

        if was_running {
            info!(service_id = %self.id, timeout = ?timeout, "Shutting down job queue");
        }

        let poll_interval = self.config.shutdown.poll_interval();
        let started = Instant::now();
        let report = loop {
            let in_flight = self.core.stats.in_flight();
            let waited = started.elapsed();

            if in_flight == 0 {
                break ShutdownReport {
                    drained: true,
                    in_flight,
                    waited,
                };
            }
            if waited >= timeout {
                warn!(in_flight, "Shutdown timeout reached with jobs still running");
                break ShutdownReport {
                    drained: false,
                    in_flight,
                    waited,
                };
            }

            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        };

        // Remaining workers exit on their own after the current job.
        self.tasks.lock().clear();

        if was_running {
            info!(
                service_id = %self.id,
                drained = report.drained,
                waited_ms = report.waited.as_millis() as u64,
                "Job queue stopped"
            );
        }
        report
    }

    /// Returns true between `start` and `shutdown`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for JobQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueueService")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("queues", &self.core.queues)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_config::BackoffConfig;

    fn service() -> JobQueueService {
        JobQueueService::new(JobsConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = JobsConfig::default();
        config.workers.low = 0;
        config.max_attempts = 0;

        let err = JobQueueService::new(config).unwrap_err();
        match err {
            JobError::Configuration(msg) => {
                assert!(msg.contains("low"));
                assert!(msg.contains("max_attempts"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_submit_applies_defaults() {
        let service = service();
        let job = service
            .submit("send_message", Payload::new(), Priority::High)
            .unwrap();

        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.timeout, Duration::from_secs(300));
        assert_eq!(service.get(&job.id).unwrap().status, crate::JobStatus::Pending);

        let stats = service.stats();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.pending(Priority::High), 1);
        assert_eq!(stats.jobs_by_type["send_message"], 1);
    }

    #[test]
    fn test_rate_limited_submission_creates_nothing() {
        let config = JobsConfig::default().with_rate_limit("bulk", RateLimitConfig::per_minute(1));
        let service = JobQueueService::new(config).unwrap();

        service.submit("bulk", Payload::new(), Priority::Low).unwrap();
        let err = service.submit("bulk", Payload::new(), Priority::Low).unwrap_err();
        assert!(matches!(err, JobError::RateLimited { ref job_type } if job_type == "bulk"));

        let stats = service.stats();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.rejected_jobs, 1);
        assert_eq!(service.list(&JobFilter::new()).len(), 1);
    }

    #[test]
    fn test_runtime_rate_limits() {
        let service = service();
        assert!(service.set_rate_limit("bulk", 0, Duration::from_secs(60)).is_err());

        service.set_rate_limit("bulk", 1, Duration::from_secs(60)).unwrap();
        service.submit("bulk", Payload::new(), Priority::Normal).unwrap();
        assert!(service.submit("bulk", Payload::new(), Priority::Normal).is_err());

        assert!(service.remove_rate_limit("bulk"));
        assert!(service.submit("bulk", Payload::new(), Priority::Normal).is_ok());
    }

    #[test]
    fn test_cancel_updates_stats() {
        let service = service();
        let job = service.submit("echo", Payload::new(), Priority::Urgent).unwrap();

        let cancelled = service.cancel(&job.id).unwrap();
        assert!(cancelled.completed_at.is_some());

        let stats = service.stats();
        assert_eq!(stats.cancelled_jobs, 1);
        assert_eq!(stats.pending(Priority::Urgent), 0);
        assert!(matches!(service.cancel(&job.id), Err(JobError::NotCancellable { .. })));
        assert!(matches!(service.cancel(&JobId::new()), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_get_unknown_job() {
        let service = service();
        assert!(matches!(service.get(&JobId::new()), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_backoff_from_config() {
        let mut config = JobsConfig::default();
        config.backoff = BackoffConfig {
            base_delay_ms: 10,
            ..BackoffConfig::default()
        };
        let service = JobQueueService::new(config).unwrap();
        assert_eq!(service.core.backoff.delay_for_attempt(2), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let service = service();
        service.start().unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start(), Err(JobError::Worker(_))));

        let report = service.shutdown(Duration::from_secs(1)).await;
        assert!(report.drained);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_without_start_is_immediate() {
        let service = service();
        let report = service.shutdown(Duration::from_secs(5)).await;
        assert!(report.drained);
        assert_eq!(report.in_flight, 0);
    }
}
