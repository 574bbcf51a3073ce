//! Root configuration document.

use crate::JobsConfig;
use herald_core::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

/// Everything the host reads at startup, one table per section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: HostConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

/// `[app]` section: identifies the running host in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_name")]
    pub name: String,

    /// `development`, `staging` or `production`; also picks the overlay file.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl HostConfig {
    /// True when running with the production overlay.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            environment: default_environment(),
        }
    }
}

fn default_host_name() -> String {
    "herald".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.app.name, "herald");
        assert!(!config.app.is_production());
        assert_eq!(config.jobs.max_attempts, 3);
    }

    #[test]
    fn test_production_flag() {
        let config: AppConfig =
            toml::from_str("[app]\nenvironment = \"Production\"\n").unwrap();
        assert!(config.app.is_production());
    }
}
