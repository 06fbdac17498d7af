//! The governed WAL.
//!
//! A [`Wal`] is a raw [`WalBackend`](walstream_storage::WalBackend) wrapped
//! with lifecycle gating, an interceptor chain on the append path, an async
//! append pool and a registry of open scanners. [`adapt_backend_to_wal`]
//! builds one.
//!
//! ## Shutdown
//!
//! `close` refuses new work, waits for every admitted append and read to
//! finish, then tears down in a fixed order: open scanners, backend,
//! interceptors, async pool, and finally the caller's cleanup hook.

mod adaptor;

pub use adaptor::{adapt_backend_to_wal, CleanupHook, WalAdaptor};

use crate::error::WalResult;
use crate::scanner::{ReadOptions, WalScanner};
use crate::stats::WalStatsSnapshot;
use crossbeam::channel::Receiver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use walstream_message::{MessageId, MutableMessage};
use walstream_storage::ChannelInfo;
use walstream_sync::Context;

/// Delivered to `append_async` callers, exactly once per call.
pub type AppendCallback = Box<dyn FnOnce(WalResult<AppendResult>) + Send + 'static>;

/// What a successful append hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendResult {
    /// Id of the appended message, possibly rewritten by interceptors.
    #[serde(serialize_with = "serialize_id")]
    pub message_id: MessageId,
    /// Time tick assigned to the message, or 0 if no interceptor set one.
    pub time_tick: u64,
    /// Extra fields interceptors attach.
    pub extra: BTreeMap<String, String>,
}

impl AppendResult {
    /// Creates a result carrying only the backend id.
    #[must_use]
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            time_tick: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Returns an extra field.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Sets an extra field, overwriting any earlier value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }
}

fn serialize_id<S: serde::Serializer>(id: &MessageId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

/// An append-only log over one channel.
pub trait Wal: Send + Sync {
    /// Name of the backend implementation.
    fn wal_name(&self) -> &str;

    /// The channel this WAL serves.
    fn channel(&self) -> &ChannelInfo;

    /// Appends a message and waits for the result.
    ///
    /// # Errors
    ///
    /// - [`WalError::Shutdown`](crate::WalError::Shutdown) once closing has begun
    /// - [`WalError::Context`](crate::WalError::Context) if `ctx` ends while
    ///   waiting for the interceptors to become ready
    /// - whatever the interceptors or backend return
    fn append(&self, ctx: &Context, msg: MutableMessage) -> WalResult<AppendResult>;

    /// Appends on the async pool; `callback` receives the result exactly once.
    fn append_async(&self, ctx: &Context, msg: MutableMessage, callback: AppendCallback);

    /// Opens a scanner.
    ///
    /// # Errors
    ///
    /// - [`WalError::Shutdown`](crate::WalError::Shutdown) once closing has begun
    /// - [`WalError::ScannerNameExhausted`](crate::WalError::ScannerNameExhausted)
    ///   if no unique name could be generated
    /// - the backend's error if it refuses the cursor
    fn read(&self, ctx: &Context, opts: ReadOptions) -> WalResult<Arc<WalScanner>>;

    /// Returns false once the WAL is fully shut down.
    fn is_available(&self) -> bool;

    /// Receiver that disconnects once the WAL is fully shut down.
    fn available(&self) -> Receiver<()>;

    /// Current counters.
    fn stats(&self) -> WalStatsSnapshot;

    /// Shuts the WAL down. A second call blocks until the first finishes.
    fn close(&self);
}
