//! Backend trait definitions.

use crate::error::StorageResult;
use std::fmt;
use walstream_message::{ImmutableMessage, MessageId, MutableMessage};
use walstream_sync::Context;

/// The channel a backend is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelInfo {
    /// Physical channel name.
    pub name: String,
    /// Ownership term; grows each time the channel changes hands.
    pub term: i64,
}

impl ChannelInfo {
    /// Creates channel info.
    pub fn new(name: impl Into<String>, term: i64) -> Self {
        Self {
            name: name.into(),
            term,
        }
    }
}

impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.term)
    }
}

/// Where a new cursor starts.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeliverPolicy {
    /// From the first message the backend holds.
    #[default]
    Earliest,
    /// Only messages appended after the cursor opens.
    Latest,
    /// From the given message, inclusive.
    StartFrom(MessageId),
    /// From the message right after the given one.
    StartAfter(MessageId),
}

/// Options for opening a backend cursor.
#[derive(Debug, Clone)]
pub struct BackendReadOptions {
    /// Unique scanner name allocated by the caller.
    pub name: String,
    /// Start position.
    pub deliver_policy: DeliverPolicy,
}

impl BackendReadOptions {
    /// Creates read options.
    pub fn new(name: impl Into<String>, deliver_policy: DeliverPolicy) -> Self {
        Self {
            name: name.into(),
            deliver_policy,
        }
    }
}

/// A raw append-only log bound to one channel.
///
/// # Invariants
///
/// - `append` assigns each message a distinct id and the backend alone
///   decides the order of concurrent appends
/// - a cursor yields messages in that order
/// - after `close`, `append` and `read` fail with
///   [`StorageError::Closed`](crate::StorageError::Closed)
/// - backends must be `Send + Sync`; the adaptor calls them from many
///   threads at once
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
pub trait WalBackend: Send + Sync {
    /// Name of the backend implementation, stamped into every message id.
    fn wal_name(&self) -> &str;

    /// The channel this backend serves.
    fn channel(&self) -> &ChannelInfo;

    /// Durably appends a message and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed, the context ends while the
    /// backend is blocked, or the write fails.
    fn append(&self, ctx: &Context, msg: MutableMessage) -> StorageResult<MessageId>;

    /// Opens a cursor at the requested position.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or the position is invalid.
    fn read(&self, ctx: &Context, opts: BackendReadOptions)
        -> StorageResult<Box<dyn BackendScanner>>;

    /// Releases backend resources. Idempotent.
    fn close(&self);
}

/// A cursor over a backend's messages.
pub trait BackendScanner: Send + Sync {
    /// Returns the next message, blocking until one is available.
    ///
    /// `Ok(None)` means the log has ended or the cursor was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the context ends before a message arrives or the
    /// backend fails.
    fn next(&self, ctx: &Context) -> StorageResult<Option<ImmutableMessage>>;

    /// Releases cursor resources and wakes a blocked `next`. Idempotent.
    fn close(&self);
}
