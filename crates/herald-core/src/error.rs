//! Workspace-wide error type.

use thiserror::Error;

/// Errors raised outside the queue itself: loading configuration,
/// installing the tracing subscriber, and host plumbing.
///
/// Per-job failures are `herald_jobs::JobError`.
#[derive(Error, Debug)]
pub enum HeraldError {
    /// Configuration could not be read, parsed, or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// A value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else, with context attached by the caller.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HeraldError {
    /// Stable code for log fields and exit diagnostics.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    #[must_use]
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            HeraldError::configuration("missing").error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(HeraldError::telemetry("already set").error_code(), "TELEMETRY_ERROR");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config/default.toml");
        assert_eq!(HeraldError::from(io).error_code(), "IO_ERROR");
    }

    #[test]
    fn test_json_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = HeraldError::from(parse);
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
        assert!(err.to_string().starts_with("serialization error:"));
    }

    #[test]
    fn test_from_anyhow_is_transparent() {
        let err: HeraldError = anyhow::anyhow!("boom").into();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.to_string(), "boom");
    }
}
