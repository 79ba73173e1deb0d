use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Missing configuration value: {0}. Pass it with --set {0}=<value>, in batchenc.toml or as an environment variable.")]
    MissingKey(String),

    #[error("Invalid value for {key} ({value:?}): {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid batch definition: {0}")]
    InvalidBatch(String),

    #[error("Encoding platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BatchError {
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_names_the_key() {
        let err = BatchError::MissingKey("BITMOVIN_API_KEY".into());
        let text = err.to_string();
        assert!(text.starts_with("Missing configuration value: BITMOVIN_API_KEY."));
        assert!(text.contains("--set BITMOVIN_API_KEY=<value>"));
    }

    #[test]
    fn invalid_value_display() {
        let err = BatchError::invalid_value("TARGET_QUEUE_SIZE", "zero", "expected an integer");
        assert_eq!(
            err.to_string(),
            "Invalid value for TARGET_QUEUE_SIZE (\"zero\"): expected an integer"
        );
    }

    #[test]
    fn platform_error_converts() {
        let err: BatchError = PlatformError::UnexpectedResponse("empty body".into()).into();
        assert!(matches!(err, BatchError::Platform(_)));
    }
}
