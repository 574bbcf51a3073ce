//! Handler registry.

use crate::error::JobError;
use crate::job::{Job, JobContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Outcome of one handler invocation.
pub type HandlerResult = Result<Option<Value>, JobError>;

/// Host-supplied work for a job type.
///
/// Any `Fn(JobContext, Job) -> impl Future<Output = HandlerResult>` closure
/// is a handler.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Performs one attempt of the job.
    async fn handle(&self, ctx: JobContext, job: Job) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext, Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: JobContext, job: Job) -> HandlerResult {
        (self)(ctx, job).await
    }
}

/// Job type to handler map.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the type.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let replaced = self
            .handlers
            .write()
            .insert(job_type.clone(), handler)
            .is_some();
        info!(job_type = %job_type, replaced, "Registered job handler");
    }

    /// Removes the handler for a type.
    pub fn unregister(&self, job_type: &str) -> bool {
        let removed = self.handlers.write().remove(job_type).is_some();
        if removed {
            info!(job_type = %job_type, "Unregistered job handler");
        }
        removed
    }

    /// Looks up the handler for a type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(job_type).cloned()
    }

    /// Returns true if a handler is registered for the type.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
