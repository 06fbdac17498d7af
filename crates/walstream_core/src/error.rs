//! Error types for WAL operations.

use thiserror::Error;
use walstream_storage::StorageError;
use walstream_sync::{ContextError, PoolError};

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors returned by a [`Wal`](crate::Wal).
#[derive(Debug, Error)]
pub enum WalError {
    /// The WAL is shutting down or shut down and admits no new work.
    #[error("wal on channel {channel} is shut down")]
    Shutdown {
        /// Channel the WAL serves.
        channel: String,
    },

    /// The caller's context was cancelled or hit its deadline.
    #[error(transparent)]
    Context(ContextError),

    /// The backend failed. Passed through unmodified.
    #[error("backend error: {0}")]
    Backend(StorageError),

    /// No unique scanner name could be generated.
    #[error("no unique scanner name for channel {channel} after {attempts} attempts")]
    ScannerNameExhausted {
        /// Channel the scanner was requested on.
        channel: String,
        /// Number of names tried.
        attempts: usize,
    },

    /// An interceptor refused the append.
    #[error("append rejected by interceptor: {message}")]
    Interceptor {
        /// Why the interceptor refused.
        message: String,
    },

    /// A background thread could not be started.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        /// What the thread was for.
        what: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// The async append pool refused the job.
    #[error("append pool error: {0}")]
    Pool(#[from] PoolError),
}

impl WalError {
    /// Creates a shutdown error.
    pub fn shutdown(channel: impl Into<String>) -> Self {
        Self::Shutdown {
            channel: channel.into(),
        }
    }

    /// Creates a thread spawn error.
    pub fn spawn(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            what: what.into(),
            source,
        }
    }

    /// Creates an interceptor rejection.
    pub fn interceptor(message: impl Into<String>) -> Self {
        Self::Interceptor {
            message: message.into(),
        }
    }

    /// Returns true if the WAL refused the call because it is shutting down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ScannerNameExhausted { .. })
    }
}

impl From<ContextError> for WalError {
    fn from(err: ContextError) -> Self {
        Self::Context(err)
    }
}

impl From<StorageError> for WalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Context(ctx) => Self::Context(ctx),
            other => Self::Backend(other),
        }
    }
}
