//! Error types for backend operations.

use std::io;
use thiserror::Error;
use walstream_sync::ContextError;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors a backend can report.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend has been closed.
    #[error("backend is closed")]
    Closed,

    /// The log has been sealed and takes no more appends.
    #[error("log is sealed")]
    Sealed,

    /// A read position does not name a message this backend can start from.
    #[error("invalid read position: {message}")]
    InvalidPosition {
        /// What was wrong with the position.
        message: String,
    },

    /// A blocking backend call was cut short by its context.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Any other backend-specific failure.
    #[error("backend error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Creates an invalid position error.
    pub fn invalid_position(message: impl Into<String>) -> Self {
        Self::InvalidPosition {
            message: message.into(),
        }
    }

    /// Wraps an arbitrary backend error.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}
