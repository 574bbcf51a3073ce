//! # Herald Server
//!
//! Host process for the Herald job queue: loads configuration, initialises
//! logging, starts the worker pools and drains them on Ctrl+C or SIGTERM.

use anyhow::Context;
use herald_config::ConfigLoader;
use herald_core::telemetry::init_tracing;
use herald_jobs::{register_metrics, JobQueueInterface, JobQueueService, JobRequest, Payload, Priority};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod handlers;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be up yet if configuration failed to load.
        eprintln!("Application error: {e:#}");
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_loader =
        ConfigLoader::from_default_location().context("failed to load configuration")?;
    let config = config_loader.get().await;

    init_tracing(&config.telemetry).context("failed to initialize logging")?;

    info!("Starting Herald job queue...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    register_metrics();

    let shutdown_timeout = config.jobs.shutdown.timeout();
    let queue: Arc<dyn JobQueueInterface> = Arc::new(
        JobQueueService::new(config.jobs).context("invalid job queue configuration")?,
    );

    handlers::register_all(queue.as_ref());
    queue.start().context("failed to start job queue")?;

    let mut payload = Payload::new();
    payload.insert("message".into(), json!("herald started"));
    match queue.enqueue(JobRequest::new("echo", payload).priority(Priority::Low)) {
        Ok(job) => info!(job_id = %job.id, "Submitted startup job"),
        Err(e) => warn!(error = %e, "Failed to submit startup job"),
    }

    shutdown_signal().await;

    let report = queue.shutdown(shutdown_timeout).await;
    let stats = queue.queue_stats();
    info!(
        drained = report.drained,
        in_flight = report.in_flight,
        completed = stats.completed_jobs,
        failed = stats.failed_jobs,
        pending = stats.pending_total(),
        "Shutdown complete"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
