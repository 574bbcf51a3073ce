//! Herald Jobs - In-Process Priority Job Queue
//!
//! The background job queue of the Herald messaging host:
//! - Four priority tiers (urgent, high, normal, low), each with its own
//!   fixed-size worker pool
//! - Per-job-type admission rate limiting
//! - Retries with linear (or fixed / exponential) backoff
//! - Hard per-attempt timeouts and panic isolation
//! - Running statistics, periodic cleanup and reconciliation
//! - Graceful shutdown with bounded draining
//!
//! # Architecture
//!
//! ```text
//!   submit ──► RateLimiter ──► ┌────────┬────────┬────────┬────────┐
//!                              │ Urgent │  High  │ Normal │  Low   │  tier queues
//!                              └───┬────┴───┬────┴───┬────┴───┬────┘
//!                                  ▼        ▼        ▼        ▼
//!                               workers  workers  workers  workers   (5 / 3 / 2 / 1)
//!                                  │
//!                                  ▼
//!                           HandlerRegistry ──► handler(ctx, job)
//!                                  │
//!                     ┌────────────┼──────────────┐
//!                     ▼            ▼              ▼
//!                 Completed     Retrying        Failed
//!                              (re-queued
//!                              with backoff)
//! ```
//!
//! Jobs live in memory only.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_jobs::prelude::*;
//! use herald_config::JobsConfig;
//!
//! let queue = JobQueueService::new(JobsConfig::default())?;
//!
//! queue.register_handler("send_message", |ctx: JobContext, job: Job| async move {
//!     let to = job.payload.get("to").and_then(|v| v.as_str())
//!         .ok_or_else(|| JobError::InvalidPayload("missing 'to'".into()))?;
//!     tracing::info!(attempt = ctx.attempt, to, "Sending message");
//!     Ok(None)
//! });
//!
//! queue.start()?;
//! let job = queue.submit("send_message", payload, Priority::High)?;
//! // ...
//! queue.shutdown(Duration::from_secs(30)).await;
//! ```

pub mod di;
pub mod error;
mod housekeeping;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
pub mod service;
pub mod stats;
mod worker;

pub use di::JobQueueInterface;
pub use error::{JobError, JobResult};
pub use herald_core::JobId;
pub use job::{Job, JobContext, JobRequest, JobStatus, Payload, Priority};
pub use crate::metrics::{register_metrics, JobEvent, QueueMetrics};
pub use queue::{JobFilter, PriorityQueues};
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use registry::{HandlerRegistry, HandlerResult, JobHandler};
pub use retry::BackoffPolicy;
pub use service::{JobQueueService, ShutdownReport};
pub use stats::{QueueStats, StatsCollector};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::job::{Job, JobContext, JobRequest, JobStatus, Payload, Priority};
    pub use crate::registry::{HandlerResult, JobHandler};
    pub use crate::service::JobQueueService;
    pub use crate::{JobError, JobId, JobQueueInterface, JobResult};
}
