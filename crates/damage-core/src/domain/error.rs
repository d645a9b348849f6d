//! Error taxonomy for the analysis pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Coarse classification of an [`AnalysisError`], suitable for persisting in
/// a failed analysis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisErrorKind {
    Decode,
    UnsupportedFormat,
    ModelUnavailable,
    Inference,
    Io,
}

impl AnalysisErrorKind {
    /// Whether the failure is attributable to the submitted input.
    pub fn is_client_fault(self) -> bool {
        matches!(self, Self::Decode | Self::UnsupportedFormat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::UnsupportedFormat => "unsupported_format",
            Self::ModelUnavailable => "model_unavailable",
            Self::Inference => "inference",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by a single pipeline invocation.
///
/// None of these are retried internally: the pipeline is deterministic, so
/// retrying the same input reproduces the same failure.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("classification model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    pub fn kind(&self) -> AnalysisErrorKind {
        match self {
            Self::Decode(_) => AnalysisErrorKind::Decode,
            Self::UnsupportedFormat(_) => AnalysisErrorKind::UnsupportedFormat,
            Self::ModelUnavailable(_) => AnalysisErrorKind::ModelUnavailable,
            Self::Inference(_) => AnalysisErrorKind::Inference,
            Self::Io { .. } => AnalysisErrorKind::Io,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::Decode("truncated PNG chunk".to_string());
        assert!(err.to_string().contains("failed to decode image"));
        assert!(err.to_string().contains("truncated PNG chunk"));

        let err = AnalysisError::ModelUnavailable("weights missing".to_string());
        assert!(err.to_string().contains("model unavailable"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AnalysisError::UnsupportedFormat("ico".into()).kind(),
            AnalysisErrorKind::UnsupportedFormat
        );
        assert_eq!(
            AnalysisError::Inference("nan".into()).kind(),
            AnalysisErrorKind::Inference
        );
        assert!(AnalysisErrorKind::Decode.is_client_fault());
        assert!(!AnalysisErrorKind::ModelUnavailable.is_client_fault());
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error;

        let err = AnalysisError::Io {
            path: PathBuf::from("/tmp/missing.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/tmp/missing.jpg"));
    }

    #[test]
    fn test_config_error_invalid() {
        let err = ConfigError::invalid("severity.high_threshold", "must be within [0, 1]");
        let msg = err.to_string();
        assert!(msg.contains("severity.high_threshold"));
        assert!(msg.contains("[0, 1]"));
    }
}
