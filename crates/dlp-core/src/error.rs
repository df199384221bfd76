//! Error types for DLP core.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for referential and configuration operations.
///
/// Per-event masking never surfaces these: filters degrade to leaving the
/// field unmasked (or fully masked under fail-closed) and log instead.
#[derive(Debug, Error)]
pub enum DlpError {
    /// A referential or configuration file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration failed to parse.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DlpError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
