//! Error taxonomy for the calibration core.
//!
//! Content problems inside a calibration file are never errors (the parser
//! skips lines it does not understand). Everything that does reach a caller
//! is one of the variants below; the HTTP layer maps them to status codes.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    /// A calibration file could not be opened or read.
    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The calibration directory itself is missing or unreadable.
    #[error("calibration directory {} is not readable: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
