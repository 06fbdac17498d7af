//! Fault injection for backend-facing tests.
//!
//! [`FaultyBackend`] wraps any backend and fails, slows, or counts calls on
//! demand, so tests can check how the WAL passes backend failures through.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use walstream_storage::{ChannelInfo, InMemoryBackend, WalBackend};
//! use walstream_sync::Context;
//! use walstream_testkit::{insert_message, FaultyBackend};
//!
//! let backend = FaultyBackend::new(Arc::new(InMemoryBackend::new(ChannelInfo::new("ch", 1))));
//! backend.fail_appends_after(1);
//! assert!(backend.append(&Context::background(), insert_message("ok")).is_ok());
//! assert!(backend.append(&Context::background(), insert_message("boom")).is_err());
//! ```

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walstream_message::{MessageId, MutableMessage};
use walstream_storage::{
    BackendReadOptions, BackendScanner, ChannelInfo, StorageError, StorageResult, WalBackend,
};
use walstream_sync::Context;

/// A backend wrapper that can simulate failures.
pub struct FaultyBackend {
    inner: Arc<dyn WalBackend>,
    fail_appends_after: AtomicUsize,
    appends_attempted: AtomicUsize,
    appends_forwarded: AtomicUsize,
    fail_reads: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
    closes: AtomicUsize,
}

impl FaultyBackend {
    /// Wraps `inner` with every fault disabled.
    pub fn new(inner: Arc<dyn WalBackend>) -> Self {
        Self {
            inner,
            fail_appends_after: AtomicUsize::new(usize::MAX),
            appends_attempted: AtomicUsize::new(0),
            appends_forwarded: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            append_delay: Mutex::new(None),
            closes: AtomicUsize::new(0),
        }
    }

    /// Lets `count` more appends through, then fails every later one.
    pub fn fail_appends_after(&self, count: usize) {
        let attempted = self.appends_attempted.load(Ordering::SeqCst);
        self.fail_appends_after
            .store(attempted.saturating_add(count), Ordering::SeqCst);
    }

    /// Sets whether opening a cursor fails.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Delays every append, honouring the caller's context.
    pub fn set_append_delay(&self, delay: Option<Duration>) {
        *self.append_delay.lock() = delay;
    }

    /// Clears every fault.
    pub fn reset(&self) {
        self.fail_appends_after.store(usize::MAX, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
        *self.append_delay.lock() = None;
    }

    /// Appends that reached this wrapper.
    pub fn appends_attempted(&self) -> usize {
        self.appends_attempted.load(Ordering::SeqCst)
    }

    /// Appends that reached the wrapped backend.
    pub fn appends_forwarded(&self) -> usize {
        self.appends_forwarded.load(Ordering::SeqCst)
    }

    /// Times `close` was called.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl WalBackend for FaultyBackend {
    fn wal_name(&self) -> &str {
        self.inner.wal_name()
    }

    fn channel(&self) -> &ChannelInfo {
        self.inner.channel()
    }

    fn append(&self, ctx: &Context, msg: MutableMessage) -> StorageResult<MessageId> {
        let attempt = self.appends_attempted.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.fail_appends_after.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other(
                "simulated failure during append",
            )));
        }
        let delay = *self.append_delay.lock();
        if let Some(delay) = delay {
            ctx.sleep(delay)?;
        }
        self.appends_forwarded.fetch_add(1, Ordering::SeqCst);
        self.inner.append(ctx, msg)
    }

    fn read(
        &self,
        ctx: &Context,
        opts: BackendReadOptions,
    ) -> StorageResult<Box<dyn BackendScanner>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other(
                "simulated failure opening cursor",
            )));
        }
        self.inner.read(ctx, opts)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}
