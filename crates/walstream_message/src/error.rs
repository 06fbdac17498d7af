//! Error types for the message crate.

use thiserror::Error;

/// Result type for message operations.
pub type MessageResult<T> = Result<T, MessageError>;

/// Errors that can occur while decoding message metadata.
///
/// These are only surfaced by the explicit decoding helpers. Accessors on
/// messages treat a corrupt reserved property as a broken invariant and
/// panic instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// An encoded message id could not be decoded.
    #[error("invalid message id for wal {wal_name}: {message}")]
    InvalidMessageId {
        /// Name of the WAL implementation the id belongs to.
        wal_name: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// An encoded integer property could not be decoded.
    #[error("invalid integer property value: {value:?}")]
    InvalidInteger {
        /// The raw property value.
        value: String,
    },
}

impl MessageError {
    /// Creates an invalid message id error.
    pub fn invalid_message_id(wal_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMessageId {
            wal_name: wal_name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid integer error.
    pub fn invalid_integer(value: impl Into<String>) -> Self {
        Self::InvalidInteger {
            value: value.into(),
        }
    }
}
