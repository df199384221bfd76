//! Error types for the denylist builder.

use dlp_core::DlpError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for denylist operations.
pub type Result<T> = std::result::Result<T, DenylistError>;

/// Errors that abort a builder run.
///
/// An aborted run writes nothing and commits no stream offsets, so the
/// next scheduled run sees the same records again.
#[derive(Debug, Error)]
pub enum DenylistError {
    /// Referential read or configuration failure from the core crate.
    #[error(transparent)]
    Core(#[from] DlpError),

    /// Referential write or spool file failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A record payload could not be decoded.
    #[error("malformed record payload: {0}")]
    Payload(String),

    /// The record source failed.
    #[error("record source error: {0}")]
    Source(String),

    /// Broker client failure.
    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The blocking builder task panicked or was cancelled.
    #[error("builder task failed: {0}")]
    Task(String),
}

impl DenylistError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_is_transparent() {
        let err: DenylistError = DlpError::InvalidConfig("bad".to_string()).into();
        assert_eq!(err.to_string(), "Invalid configuration: bad");
    }

    #[test]
    fn test_io_error_display() {
        let err = DenylistError::io(
            "/pdata/DLP/app.data",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/pdata/DLP/app.data"));
    }
}
