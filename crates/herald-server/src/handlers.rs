//! Built-in job handlers.

use herald_jobs::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Returns the payload unchanged.
pub async fn echo(_ctx: JobContext, job: Job) -> HandlerResult {
    Ok(Some(Value::Object(job.payload)))
}

/// Stand-in for message delivery: validates the recipient and simulates
/// the round trip, giving up early if the attempt's deadline is signalled.
pub async fn send_message(ctx: JobContext, job: Job) -> HandlerResult {
    let to = job
        .payload
        .get("to")
        .and_then(Value::as_str)
        .ok_or_else(|| JobError::InvalidPayload("missing 'to'".to_string()))?;

    info!(job_id = %ctx.job_id, attempt = ctx.attempt, to, "Delivering message");

    tokio::select! {
        () = ctx.cancelled() => Err(JobError::Cancelled),
        () = tokio::time::sleep(Duration::from_millis(50)) => {
            Ok(Some(json!({ "to": to, "delivered": true })))
        }
    }
}

/// Registers the built-in handlers.
pub fn register_all(queue: &dyn JobQueueInterface) {
    queue.register_handler("echo", Arc::new(echo));
    queue.register_handler("send_message", Arc::new(send_message));
}
