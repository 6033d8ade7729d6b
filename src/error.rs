//! Error types for the chi-square pipeline.
//!
//! Only configuration and storage failures surface as [`Chi2Error`]. Problems
//! with a single input record are [`RecordError`]s: the counter logs them,
//! counts them and moves on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Chi2Error>;

/// Fatal errors. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum Chi2Error {
    /// Bad run configuration, including a missing or unreadable stopword file.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Encoding or decoding of a tab-separated stage file failed.
    #[error("Stage file error on {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A committed stage output could not be restored.
    #[error("Checkpoint error in {}: {message}", .path.display())]
    Checkpoint { path: PathBuf, message: String },
}

impl Chi2Error {
    pub fn config(message: impl Into<String>) -> Self {
        Chi2Error::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Chi2Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Chi2Error::Checkpoint {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Why a single input record was skipped.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("empty field `{0}`")]
    EmptyField(&'static str),
}
