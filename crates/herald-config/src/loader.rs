//! Layered configuration loading.
//!
//! Sources, lowest precedence first:
//!
//! 1. `.env` in the working directory (exported into the process env)
//! 2. `{dir}/default.toml`
//! 3. `{dir}/{HERALD_ENVIRONMENT}.toml` (`development` when unset)
//! 4. `{dir}/local.toml`
//! 5. `HERALD__SECTION__KEY` environment variables
//!
//! Missing files are skipped. The merged document is validated before it is
//! handed out.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use config::{Config, Environment, File, FileFormat};
use herald_core::{HeraldError, HeraldResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const ENV_PREFIX: &str = "HERALD";
const ENVIRONMENT_VAR: &str = "HERALD_ENVIRONMENT";
const DEFAULT_DIR: &str = "./config";

/// Holds the current [`AppConfig`] and can re-read it from disk.
#[derive(Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
    current: Arc<RwLock<AppConfig>>,
}

impl ConfigLoader {
    /// Loads and validates configuration from `dir`.
    pub fn new(dir: impl AsRef<Path>) -> HeraldResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = load(&dir)?;
        Ok(Self {
            dir,
            current: Arc::new(RwLock::new(config)),
        })
    }

    /// Loads from `./config`.
    pub fn from_default_location() -> HeraldResult<Self> {
        Self::new(DEFAULT_DIR)
    }

    pub fn config_dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot of the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.current.read().await.clone()
    }

    /// Re-reads every layer. On failure the previous configuration is kept.
    pub async fn reload(&self) -> HeraldResult<()> {
        let fresh = match load(&self.dir) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Configuration reload failed, keeping previous values");
                return Err(e);
            }
        };
        *self.current.write().await = fresh;
        info!(config_dir = %self.dir.display(), "Configuration reloaded");
        Ok(())
    }

    /// Looks up a dotted path such as `jobs.workers.urgent`.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, path: &str) -> Option<T> {
        let tree = serde_json::to_value(&*self.current.read().await).ok()?;
        let node = path
            .split('.')
            .try_fold(&tree, |node, segment| node.get(segment))?;
        T::deserialize(node).ok()
    }
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn load(dir: &Path) -> HeraldResult<AppConfig> {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable .env"),
    }

    let environment =
        std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());

    let mut builder = Config::builder();
    let mut layers = Vec::new();
    for name in ["default", environment.as_str(), "local"] {
        let path = dir.join(format!("{name}.toml"));
        if path.is_file() {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
            layers.push(name.to_string());
        }
    }

    let merged = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|merged| merged.try_deserialize::<AppConfig>())
        .map_err(|e| HeraldError::configuration(e.to_string()))?;

    ConfigValidator::validate(&merged)
        .map_err(|errors| HeraldError::configuration(format_validation_errors(&errors)))?;

    info!(
        environment = %environment,
        config_dir = %dir.display(),
        layers = ?layers,
        "Configuration loaded"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent")).unwrap();
        let config = loader.get().await;
        assert_eq!(config.app.name, "herald");
        assert_eq!(config.jobs.workers.urgent, 5);
    }

    #[tokio::test]
    async fn test_local_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "default.toml",
            r#"
            [jobs]
            max_attempts = 4

            [jobs.workers]
            normal = 6

            [jobs.rate_limits.bulk]
            max_tokens = 2
            "#,
        );
        write(
            dir.path(),
            "local.toml",
            r#"
            [jobs.workers]
            normal = 9
            "#,
        );

        let loader = ConfigLoader::new(dir.path()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.jobs.max_attempts, 4);
        assert_eq!(config.jobs.workers.normal, 9);
        assert_eq!(config.jobs.rate_limits["bulk"].max_tokens, 2);

        let attempts: Option<u32> = loader.get_value("jobs.max_attempts").await;
        assert_eq!(attempts, Some(4));
        assert_eq!(loader.get_value::<u32>("jobs.nope").await, None);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default.toml", "[jobs]\nmax_attempts = 0\n");

        let err = ConfigLoader::new(dir.path()).unwrap_err();
        assert!(matches!(err, HeraldError::Configuration(msg) if msg.contains("max_attempts")));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default.toml", "[jobs]\nmax_attempts = 2\n");
        let loader = ConfigLoader::new(dir.path()).unwrap();
        assert_eq!(loader.get().await.jobs.max_attempts, 2);

        write(dir.path(), "default.toml", "[jobs]\nmax_attempts = 7\n");
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.jobs.max_attempts, 7);

        write(dir.path(), "default.toml", "[jobs]\nmax_attempts = 0\n");
        assert!(loader.reload().await.is_err());
        assert_eq!(loader.get().await.jobs.max_attempts, 7);
    }
}
