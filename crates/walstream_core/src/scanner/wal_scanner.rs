//! Scanner handed out by a WAL.

use super::MessageFilter;
use crate::error::WalResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use walstream_message::ImmutableMessage;
use walstream_storage::{BackendScanner, ChannelInfo};
use walstream_sync::Context;

type Cleanup = Box<dyn FnOnce() + Send>;

/// A read cursor over one channel.
///
/// Produces messages lazily from its start position. The sequence ends only
/// when the backend reports end-of-log or the scanner is closed; otherwise
/// [`WalScanner::next`] blocks until a message arrives or its context ends.
pub struct WalScanner {
    name: String,
    id: i64,
    channel: ChannelInfo,
    inner: Box<dyn BackendScanner>,
    filter: Option<MessageFilter>,
    closed: AtomicBool,
    cleanup: Mutex<Option<Cleanup>>,
}

impl WalScanner {
    /// Wraps a backend cursor. `cleanup` runs once, on the first `close`.
    #[must_use]
    pub fn new(
        name: String,
        id: i64,
        channel: ChannelInfo,
        inner: Box<dyn BackendScanner>,
        filter: Option<MessageFilter>,
        cleanup: Cleanup,
    ) -> Self {
        Self {
            name,
            id,
            channel,
            inner,
            filter,
            closed: AtomicBool::new(false),
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    /// Unique name among the channel's open scanners.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The channel being read.
    #[must_use]
    pub fn channel(&self) -> &ChannelInfo {
        &self.channel
    }

    /// Returns true once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the next message that passes the filter.
    ///
    /// `Ok(None)` means the log ended or the scanner was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if `ctx` ends first or the backend fails.
    pub fn next(&self, ctx: &Context) -> WalResult<Option<ImmutableMessage>> {
        loop {
            if self.is_closed() {
                return Ok(None);
            }
            let Some(msg) = self.inner.next(ctx)? else {
                return Ok(None);
            };
            match &self.filter {
                Some(keep) if !keep(&msg) => continue,
                _ => return Ok(Some(msg)),
            }
        }
    }

    /// Iterates over messages until the log ends, the scanner closes, or an
    /// error occurs. The error, if any, is the last item.
    pub fn messages<'a>(&'a self, ctx: &'a Context) -> Messages<'a> {
        Messages {
            scanner: self,
            ctx,
            done: false,
        }
    }

    /// Stops the scanner and runs its cleanup. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.close();
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        debug!(scanner = %self.name, id = self.id, channel = %self.channel, "scanner closed");
    }
}

impl fmt::Debug for WalScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalScanner")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Iterator returned by [`WalScanner::messages`].
pub struct Messages<'a> {
    scanner: &'a WalScanner,
    ctx: &'a Context,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = WalResult<ImmutableMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scanner.next(self.ctx) {
            Ok(Some(msg)) => Some(Ok(msg)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use walstream_message::{BasicMessage, MessageType, MutableMessage};
    use walstream_storage::{
        BackendReadOptions, DeliverPolicy, InMemoryBackend, StorageError, WalBackend,
    };
    use walstream_sync::ContextError;

    fn backend_with(payloads: &[&str]) -> InMemoryBackend {
        let backend = InMemoryBackend::new(ChannelInfo::new("ch", 1));
        let ctx = Context::background();
        for p in payloads {
            let msg = MutableMessage::builder(MessageType::Insert)
                .payload(p.as_bytes().to_vec())
                .build();
            backend.append(&ctx, msg).unwrap();
        }
        backend
    }

    fn open(
        backend: &InMemoryBackend,
        filter: Option<MessageFilter>,
        cleanup: Cleanup,
    ) -> WalScanner {
        let inner = backend
            .read(
                &Context::background(),
                BackendReadOptions::new("s", DeliverPolicy::Earliest),
            )
            .unwrap();
        WalScanner::new("s".into(), 1, backend.channel().clone(), inner, filter, cleanup)
    }

    #[test]
    fn messages_iterates_until_sealed() {
        let backend = backend_with(&["a", "b"]);
        backend.seal();
        let scanner = open(&backend, None, Box::new(|| {}));
        let ctx = Context::background();
        let payloads: Vec<Vec<u8>> = scanner
            .messages(&ctx)
            .map(|m| m.unwrap().payload().to_vec())
            .collect();
        assert_eq!(payloads, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn filter_skips_messages() {
        let backend = backend_with(&["keep", "drop", "keep"]);
        backend.seal();
        let filter: MessageFilter = Arc::new(|m: &ImmutableMessage| m.payload() == b"keep");
        let scanner = open(&backend, Some(filter), Box::new(|| {}));
        let ctx = Context::background();
        assert_eq!(scanner.messages(&ctx).count(), 2);
    }

    #[test]
    fn close_runs_cleanup_once() {
        let backend = backend_with(&["a"]);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let scanner = open(
            &backend,
            None,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scanner.close();
        scanner.close();
        assert!(scanner.is_closed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(scanner.next(&Context::background()).unwrap().is_none());
    }

    #[test]
    fn iterator_ends_with_context_error() {
        let backend = backend_with(&["a"]);
        let scanner = open(&backend, None, Box::new(|| {}));
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let items: Vec<_> = scanner.messages(&ctx).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(WalError::Context(ContextError::DeadlineExceeded))
        ));
    }

    #[test]
    fn backend_errors_pass_through() {
        let backend = backend_with(&[]);
        let scanner = open(&backend, None, Box::new(|| {}));
        backend.close();
        assert!(matches!(
            scanner.next(&Context::background()),
            Err(WalError::Backend(StorageError::Closed))
        ));
    }
}
