//! Tracing initialisation.
//!
//! Sets up a `tracing-subscriber` registry with an `EnvFilter` and a fmt
//! layer, either human-readable or JSON.

use crate::{HeraldError, HeraldResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Whether to include the event target in output.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_service_name() -> String {
    "herald".to_string()
}

fn default_filter() -> String {
    "info,herald=debug".to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            filter: default_filter(),
            json: false,
            with_target: default_with_target(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> HeraldResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| HeraldError::Configuration(format!("Invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| HeraldError::Telemetry(format!("failed to install subscriber: {e}")))?;

    tracing::info!(
        service_name = %config.service_name,
        json = config.json,
        "Tracing initialized"
    );

    Ok(())
}
