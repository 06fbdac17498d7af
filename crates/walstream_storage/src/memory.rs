//! In-memory backend for testing and ephemeral channels.

use crate::backend::{BackendReadOptions, BackendScanner, ChannelInfo, DeliverPolicy, WalBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use walstream_message::{ImmutableMessage, MessageId, MutableMessage};
use walstream_sync::{Context, ContextError, Signal};

/// Default WAL name stamped into ids issued by [`InMemoryBackend`].
pub const MEMORY_WAL_NAME: &str = "memory";

/// An in-memory backend.
///
/// Messages get sequential ids starting at 1, in the order their appends
/// take the log's write lock. Cursors block for new messages until the log
/// is [sealed](InMemoryBackend::seal), the cursor is closed, or the backend
/// is closed.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use walstream_message::{MessageType, MutableMessage};
/// use walstream_storage::{ChannelInfo, InMemoryBackend, WalBackend};
/// use walstream_sync::Context;
///
/// let backend = InMemoryBackend::new(ChannelInfo::new("ch", 1));
/// let msg = MutableMessage::builder(MessageType::Insert).build();
/// let id = backend.append(&Context::background(), msg).unwrap();
/// assert_eq!(id.as_u64(), Some(1));
/// assert_eq!(backend.len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    channel: ChannelInfo,
    wal_name: Arc<str>,
    log: Arc<Log>,
}

#[derive(Debug)]
struct Log {
    entries: RwLock<Vec<ImmutableMessage>>,
    // Replaced and fired on every append and on seal.
    notify: Mutex<Signal>,
    sealed: AtomicBool,
    closed: Signal,
}

impl Log {
    fn notifier(&self) -> Signal {
        self.notify.lock().clone()
    }

    fn wake_readers(&self) {
        let old = std::mem::take(&mut *self.notify.lock());
        old.fire();
    }
}

impl InMemoryBackend {
    /// Creates an empty backend named [`MEMORY_WAL_NAME`].
    #[must_use]
    pub fn new(channel: ChannelInfo) -> Self {
        Self::with_wal_name(channel, MEMORY_WAL_NAME)
    }

    /// Creates an empty backend with a custom WAL name.
    #[must_use]
    pub fn with_wal_name(channel: ChannelInfo, wal_name: impl Into<Arc<str>>) -> Self {
        Self {
            channel,
            wal_name: wal_name.into(),
            log: Arc::new(Log {
                entries: RwLock::new(Vec::new()),
                notify: Mutex::new(Signal::new()),
                sealed: AtomicBool::new(false),
                closed: Signal::new(),
            }),
        }
    }

    /// Number of messages in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.entries.read().len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of every message in log order.
    #[must_use]
    pub fn messages(&self) -> Vec<ImmutableMessage> {
        self.log.entries.read().clone()
    }

    /// Marks the end of the log.
    ///
    /// Later appends fail with [`StorageError::Sealed`]; cursors return
    /// `None` once they have drained the existing messages.
    pub fn seal(&self) {
        if !self.log.sealed.swap(true, Ordering::SeqCst) {
            debug!(channel = %self.channel, "log sealed");
            self.log.wake_readers();
        }
    }

    /// Returns true once [`InMemoryBackend::seal`] has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.log.sealed.load(Ordering::SeqCst)
    }

    /// Returns true once the backend is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.log.closed.is_fired()
    }

    /// Maps a deliver policy onto the index of the first message to yield.
    fn start_index(&self, policy: &DeliverPolicy, len: usize) -> StorageResult<usize> {
        let sequence = |id: &MessageId| -> StorageResult<usize> {
            if id.wal_name() != self.wal_name.as_ref() {
                return Err(StorageError::invalid_position(format!(
                    "message id {id} was not issued by wal {}",
                    self.wal_name
                )));
            }
            id.as_u64()
                .and_then(|seq| usize::try_from(seq).ok())
                .ok_or_else(|| {
                    StorageError::invalid_position(format!("message id {id} is not a sequence"))
                })
        };

        let index = match policy {
            DeliverPolicy::Earliest => 0,
            DeliverPolicy::Latest => len,
            DeliverPolicy::StartFrom(id) => {
                let seq = sequence(id)?;
                if seq == 0 {
                    return Err(StorageError::invalid_position("sequence 0 is never issued"));
                }
                seq - 1
            }
            DeliverPolicy::StartAfter(id) => sequence(id)?,
        };

        if index > len {
            return Err(StorageError::invalid_position(format!(
                "position {} is past the end of the log ({len} messages)",
                index + 1
            )));
        }
        Ok(index)
    }
}

impl WalBackend for InMemoryBackend {
    fn wal_name(&self) -> &str {
        &self.wal_name
    }

    fn channel(&self) -> &ChannelInfo {
        &self.channel
    }

    fn append(&self, ctx: &Context, msg: MutableMessage) -> StorageResult<MessageId> {
        if self.log.closed.is_fired() {
            return Err(StorageError::Closed);
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let id = {
            let mut entries = self.log.entries.write();
            if self.log.sealed.load(Ordering::SeqCst) {
                return Err(StorageError::Sealed);
            }
            let id = MessageId::from_u64(Arc::clone(&self.wal_name), entries.len() as u64 + 1);
            entries.push(msg.into_immutable(id.clone()));
            id
        };
        self.log.wake_readers();
        Ok(id)
    }

    fn read(
        &self,
        _ctx: &Context,
        opts: BackendReadOptions,
    ) -> StorageResult<Box<dyn BackendScanner>> {
        if self.log.closed.is_fired() {
            return Err(StorageError::Closed);
        }
        let len = self.log.entries.read().len();
        let position = self.start_index(&opts.deliver_policy, len)?;
        debug!(
            channel = %self.channel,
            scanner = %opts.name,
            position,
            "opened memory cursor"
        );
        Ok(Box::new(MemoryScanner {
            name: opts.name,
            log: Arc::clone(&self.log),
            position: Mutex::new(position),
            closed: Signal::new(),
        }))
    }

    fn close(&self) {
        if self.log.closed.fire() {
            debug!(channel = %self.channel, "memory backend closed");
        }
    }
}

struct MemoryScanner {
    name: String,
    log: Arc<Log>,
    position: Mutex<usize>,
    closed: Signal,
}

impl BackendScanner for MemoryScanner {
    fn next(&self, ctx: &Context) -> StorageResult<Option<ImmutableMessage>> {
        loop {
            if self.closed.is_fired() {
                return Ok(None);
            }
            if self.log.closed.is_fired() {
                return Err(StorageError::Closed);
            }

            // Take the notifier before looking at the log so an append
            // racing with this check still wakes us.
            let wake = self.log.notifier();
            {
                let mut position = self.position.lock();
                let entries = self.log.entries.read();
                if let Some(msg) = entries.get(*position) {
                    *position += 1;
                    return Ok(Some(msg.clone()));
                }
            }
            if self.log.sealed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            let appended = wake.done();
            let cancelled = ctx.done();
            let deadline = ctx.deadline_channel();
            let closed = self.closed.done();
            let backend_closed = self.log.closed.done();
            crossbeam::select! {
                recv(appended) -> _ => {}
                recv(closed) -> _ => {}
                recv(backend_closed) -> _ => {}
                recv(cancelled) -> _ => return Err(ContextError::Cancelled.into()),
                recv(deadline) -> _ => return Err(ContextError::DeadlineExceeded.into()),
            }
        }
    }

    fn close(&self) {
        if self.closed.fire() {
            debug!(scanner = %self.name, "memory cursor closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use walstream_message::{BasicMessage, MessageType};

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new(ChannelInfo::new("test-channel", 1))
    }

    fn insert(payload: &[u8]) -> MutableMessage {
        MutableMessage::builder(MessageType::Insert)
            .payload(payload.to_vec())
            .build()
    }

    fn earliest() -> BackendReadOptions {
        BackendReadOptions::new("reader", DeliverPolicy::Earliest)
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = backend();
        assert!(backend.is_empty());
        assert_eq!(backend.wal_name(), MEMORY_WAL_NAME);
        assert_eq!(backend.channel().name, "test-channel");
    }

    #[test]
    fn memory_append_assigns_sequential_ids() {
        let backend = backend();
        let ctx = Context::background();
        for expected in 1..=3u64 {
            let id = backend.append(&ctx, insert(b"x")).unwrap();
            assert_eq!(id.as_u64(), Some(expected));
            assert_eq!(id.wal_name(), MEMORY_WAL_NAME);
        }
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn memory_read_earliest_in_order() {
        let backend = backend();
        let ctx = Context::background();
        for payload in [b"a", b"b", b"c"] {
            backend.append(&ctx, insert(payload)).unwrap();
        }
        backend.seal();

        let cursor = backend.read(&ctx, earliest()).unwrap();
        let mut payloads = Vec::new();
        while let Some(msg) = cursor.next(&ctx).unwrap() {
            payloads.push(msg.payload().to_vec());
        }
        assert_eq!(payloads, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn memory_read_latest_skips_existing() {
        let backend = backend();
        let ctx = Context::background();
        backend.append(&ctx, insert(b"old")).unwrap();

        let cursor = backend
            .read(&ctx, BackendReadOptions::new("r", DeliverPolicy::Latest))
            .unwrap();
        backend.append(&ctx, insert(b"new")).unwrap();
        backend.seal();

        assert_eq!(cursor.next(&ctx).unwrap().unwrap().payload(), b"new");
        assert!(cursor.next(&ctx).unwrap().is_none());
    }

    #[test]
    fn memory_start_from_and_after() {
        let backend = backend();
        let ctx = Context::background();
        let ids: Vec<_> = (0..3)
            .map(|_| backend.append(&ctx, insert(b"m")).unwrap())
            .collect();
        backend.seal();

        let from = backend
            .read(
                &ctx,
                BackendReadOptions::new("from", DeliverPolicy::StartFrom(ids[1].clone())),
            )
            .unwrap();
        assert_eq!(from.next(&ctx).unwrap().unwrap().message_id(), &ids[1]);

        let after = backend
            .read(
                &ctx,
                BackendReadOptions::new("after", DeliverPolicy::StartAfter(ids[1].clone())),
            )
            .unwrap();
        assert_eq!(after.next(&ctx).unwrap().unwrap().message_id(), &ids[2]);
        assert!(after.next(&ctx).unwrap().is_none());
    }

    #[test]
    fn memory_rejects_foreign_or_future_positions() {
        let backend = backend();
        let ctx = Context::background();
        let foreign = MessageId::from_u64("other", 1);
        let err = backend
            .read(
                &ctx,
                BackendReadOptions::new("r", DeliverPolicy::StartFrom(foreign)),
            )
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::InvalidPosition { .. }));

        let future = MessageId::from_u64(MEMORY_WAL_NAME, 10);
        let err = backend
            .read(
                &ctx,
                BackendReadOptions::new("r", DeliverPolicy::StartAfter(future)),
            )
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::InvalidPosition { .. }));
    }

    #[test]
    fn memory_cursor_wakes_on_append() {
        let backend = Arc::new(backend());
        let ctx = Context::background();
        let cursor = backend.read(&ctx, earliest()).unwrap();

        let writer = Arc::clone(&backend);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer.append(&Context::background(), insert(b"late")).unwrap();
        });

        let msg = cursor.next(&ctx).unwrap().unwrap();
        assert_eq!(msg.payload(), b"late");
        handle.join().unwrap();
    }

    #[test]
    fn memory_cursor_honours_deadline() {
        let backend = backend();
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let cursor = backend.read(&ctx, earliest()).unwrap();
        let err = cursor.next(&ctx).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Context(ContextError::DeadlineExceeded)
        ));
    }

    #[test]
    fn memory_cursor_close_unblocks_next() {
        let backend = backend();
        let ctx = Context::background();
        let cursor: Arc<dyn BackendScanner> = Arc::from(backend.read(&ctx, earliest()).unwrap());

        let closer = Arc::clone(&cursor);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            closer.close();
        });

        assert!(cursor.next(&ctx).unwrap().is_none());
        cursor.close();
        handle.join().unwrap();
    }

    #[test]
    fn memory_closed_backend_refuses_work() {
        let backend = backend();
        let ctx = Context::background();
        let cursor = backend.read(&ctx, earliest()).unwrap();
        backend.close();
        backend.close();

        assert!(backend.is_closed());
        assert!(matches!(
            backend.append(&ctx, insert(b"x")),
            Err(StorageError::Closed)
        ));
        assert!(matches!(backend.read(&ctx, earliest()), Err(StorageError::Closed)));
        assert!(matches!(cursor.next(&ctx), Err(StorageError::Closed)));
    }

    #[test]
    fn memory_sealed_refuses_appends() {
        let backend = backend();
        backend.seal();
        assert!(backend.is_sealed());
        assert!(matches!(
            backend.append(&Context::background(), insert(b"x")),
            Err(StorageError::Sealed)
        ));
    }

    #[test]
    fn memory_concurrent_appends_get_distinct_ids() {
        let backend = Arc::new(backend());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&backend);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| b.append(&Context::background(), insert(b"c")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|id| id.as_u64().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=400).collect::<Vec<_>>());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn drain(backend: &InMemoryBackend, policy: DeliverPolicy) -> Vec<Vec<u8>> {
            let ctx = Context::background();
            let cursor = backend
                .read(&ctx, BackendReadOptions::new("prop", policy))
                .unwrap();
            let mut out = Vec::new();
            while let Some(msg) = cursor.next(&ctx).unwrap() {
                out.push(msg.payload().to_vec());
            }
            out
        }

        proptest! {
            #[test]
            fn sealed_log_replays_in_append_order(
                payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..20),
                pick in any::<prop::sample::Index>(),
            ) {
                let backend = backend();
                let ctx = Context::background();
                let ids: Vec<_> = payloads
                    .iter()
                    .map(|p| backend.append(&ctx, insert(p)).unwrap())
                    .collect();
                backend.seal();

                prop_assert_eq!(drain(&backend, DeliverPolicy::Earliest), payloads.clone());

                let k = pick.index(ids.len());
                let after = drain(&backend, DeliverPolicy::StartAfter(ids[k].clone()));
                prop_assert_eq!(after, payloads[k + 1..].to_vec());
                let from = drain(&backend, DeliverPolicy::StartFrom(ids[k].clone()));
                prop_assert_eq!(from, payloads[k..].to_vec());
            }
        }
    }
}
