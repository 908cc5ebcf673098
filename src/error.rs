//! Error types for the preprocessing, training and inference pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the pipeline library.
///
/// `Configuration` errors are fatal and belong to initialization or training.
/// `Schema` and `Encoding` errors are data errors, reported per record at
/// inference time.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Artifacts missing or malformed, or a dataset unusable for training
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A record cannot be shaped into the frozen feature schema
    #[error("schema error: {0}")]
    Schema(String),

    /// A categorical value cannot be mapped to a code
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse error category carried into per-record error results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Configuration,
    Schema,
    Encoding,
    Io,
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        PipelineError::Schema(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        PipelineError::Encoding(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Schema(_) => ErrorKind::Schema,
            PipelineError::Encoding(_) => ErrorKind::Encoding,
            PipelineError::Serialization(_) | PipelineError::Csv(_) => ErrorKind::Schema,
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error stems from the deployment rather than from the input data
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::config("model file not found");
        assert_eq!(err.to_string(), "configuration error: model file not found");

        let err = PipelineError::schema("column Age is not numeric");
        assert_eq!(err.to_string(), "schema error: column Age is not numeric");
    }

    #[test]
    fn test_error_kind() {
        assert!(PipelineError::config("x").is_configuration());
        assert!(!PipelineError::schema("x").is_configuration());
        assert_eq!(PipelineError::encoding("x").kind(), ErrorKind::Encoding);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(PipelineError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::Configuration).unwrap();
        assert_eq!(json, "\"configuration\"");
    }
}
