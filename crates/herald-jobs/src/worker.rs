//! Tier workers.
//!
//! Each worker serves exactly one priority tier. It claims the next due job,
//! runs the registered handler under the job's timeout, and hands the job
//! back to its tier as completed, failed, or rescheduled.

use crate::error::JobError;
use crate::job::{Job, JobContext, Priority};
use crate::metrics::{JobEvent, QueueMetrics};
use crate::registry::{HandlerResult, JobHandler};
use crate::service::QueueCore;
use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// A worker bound to one tier.
pub(crate) struct Worker {
    id: String,
    priority: Priority,
    core: Arc<QueueCore>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: String,
        priority: Priority,
        core: Arc<QueueCore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            priority,
            core,
            shutdown,
        }
    }

    /// Spawns the worker loop.
    pub(crate) fn spawn(self) -> tokio::task::JoinHandle<()> {
        let span = tracing::info_span!("worker", worker_id = %self.id, priority = %self.priority);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        debug!("Worker started");

        while !self.shutdown.is_cancelled() {
            let stats = &self.core.stats;
            let claimed = self.core.queues.claim(self.priority, Utc::now(), |job| {
                stats.record_claimed(job.priority);
            });
            if let Some(job) = claimed {
                self.process(job).await;
                continue;
            }

            let notified = self.core.queues.notified(self.priority);
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = notified => {}
                () = tokio::time::sleep(self.core.poll_interval) => {}
            }
        }

        debug!("Worker stopped");
    }

    async fn process(&self, mut job: Job) {
        let core = &self.core;

        let wait_time = (Utc::now() - job.scheduled_at).to_std().unwrap_or_default();
        QueueMetrics::event(JobEvent::Claimed, &job.job_type);
        QueueMetrics::claim_delay(job.priority, wait_time);

        let Some(handler) = core.registry.get(&job.job_type) else {
            let err = JobError::NoHandler(job.job_type.clone());
            error!(job_id = %job.id, job_type = %job.job_type, "No handler registered for job type");
            job.fail(&err, Utc::now());
            core.stats.record_failed();
            QueueMetrics::failure(&job.job_type, err.kind());
            core.queues.finish(job);
            core.stats.release();
            return;
        };

        job.begin_attempt();
        core.queues.update_active(&job);

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "Processing job"
        );

        let token = CancellationToken::new();
        let ctx = JobContext::new(&job, &self.id, token.clone());
        let started = Instant::now();
        let outcome = execute(handler, ctx, job.clone(), job.timeout, token).await;
        let elapsed = started.elapsed();
        let now = Utc::now();

        match outcome {
            Ok(result) => {
                job.complete(result, now);
                core.stats.record_completed(&job.job_type, elapsed);
                QueueMetrics::event(JobEvent::Completed, &job.job_type);
                QueueMetrics::attempt(&job.job_type, "ok", elapsed);
                debug!(
                    job_id = %job.id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed"
                );
                core.queues.finish(job);
            }
            Err(err) => {
                if matches!(err, JobError::Timeout(_)) {
                    QueueMetrics::event(JobEvent::TimedOut, &job.job_type);
                }

                if !job.is_exhausted() {
                    let retry_at = core.backoff.next_run_at(job.attempts, now);
                    job.schedule_retry(&err, retry_at);
                    core.stats.record_retried(job.priority);
                    QueueMetrics::event(JobEvent::Retried, &job.job_type);
                    QueueMetrics::attempt(&job.job_type, "retry", elapsed);
                    warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt = job.attempts,
                        retry_at = %job.scheduled_at,
                        error = %err,
                        "Job attempt failed, scheduling retry"
                    );
                    core.queues.requeue(job);
                } else {
                    job.fail(&err, now);
                    core.stats.record_failed();
                    QueueMetrics::failure(&job.job_type, err.kind());
                    QueueMetrics::attempt(&job.job_type, "failed", elapsed);
                    error!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts,
                        error = %err,
                        "Job failed"
                    );
                    core.queues.finish(job);
                }
            }
        }

        core.stats.release();
    }
}

/// Runs one attempt in its own task, bounded by `limit`.
///
/// On expiry the context token is cancelled and the task aborted. A panic
/// inside the handler is reported as [`JobError::Panicked`].
pub(crate) async fn execute(
    handler: Arc<dyn JobHandler>,
    ctx: JobContext,
    job: Job,
    limit: Duration,
    token: CancellationToken,
) -> HandlerResult {
    let mut task = tokio::spawn(async move { handler.handle(ctx, job).await });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(join_error(err)),
        Err(_) => {
            token.cancel();
            task.abort();
            info!(timeout = ?limit, "Job attempt timed out, task aborted");
            Err(JobError::Timeout(limit))
        }
    }
}

fn join_error(err: JoinError) -> JobError {
    if err.is_panic() {
        JobError::Panicked(panic_message(err.into_panic().as_ref()))
    } else {
        JobError::Worker("handler task was cancelled".to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
