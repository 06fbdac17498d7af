//! WAL fixtures and message helpers.
//!
//! Provides convenience functions for setting up a WAL over an in-memory
//! backend and building messages for tests.

use std::sync::Arc;
use walstream_core::{adapt_backend_to_wal, InterceptorBuilder, Wal, WalAdaptor, WalConfig};
use walstream_message::{MessageType, MutableMessage};
use walstream_storage::{ChannelInfo, InMemoryBackend, WalBackend};

/// Channel name used by fixtures.
pub const TEST_CHANNEL: &str = "test-channel";

/// A WAL over an in-memory backend, closed on drop.
pub struct TestWal {
    /// The WAL under test.
    pub wal: Arc<WalAdaptor>,
    /// The backend beneath it, for inspecting what was written.
    pub backend: Arc<InMemoryBackend>,
}

impl TestWal {
    /// Creates a WAL with no interceptors.
    pub fn memory() -> Self {
        Self::build(Vec::new(), WalConfig::default())
    }

    /// Creates a WAL with the given interceptors.
    pub fn with_interceptors(builders: Vec<Box<dyn InterceptorBuilder>>) -> Self {
        Self::build(builders, WalConfig::default())
    }

    /// Creates a WAL with the given interceptors and configuration.
    pub fn build(builders: Vec<Box<dyn InterceptorBuilder>>, config: WalConfig) -> Self {
        let backend = Arc::new(InMemoryBackend::new(ChannelInfo::new(TEST_CHANNEL, 1)));
        let wal = adapt_backend_to_wal(
            Arc::clone(&backend) as Arc<dyn WalBackend>,
            builders,
            None,
            config,
        )
        .expect("Failed to build test WAL");
        Self { wal, backend }
    }

    /// Seals the backend so scanners end after the current messages.
    pub fn seal(&self) {
        self.backend.seal();
    }
}

impl std::ops::Deref for TestWal {
    type Target = WalAdaptor;

    fn deref(&self) -> &Self::Target {
        &self.wal
    }
}

impl Drop for TestWal {
    fn drop(&mut self) {
        self.wal.close();
    }
}

/// Runs a test with a fresh in-memory WAL.
///
/// # Example
///
/// ```rust
/// use walstream_core::Wal;
/// use walstream_sync::Context;
/// use walstream_testkit::{insert_message, with_test_wal};
///
/// with_test_wal(|wal| {
///     wal.append(&Context::background(), insert_message("x")).unwrap();
///     assert_eq!(wal.backend.len(), 1);
/// });
/// ```
pub fn with_test_wal<F, R>(f: F) -> R
where
    F: FnOnce(&TestWal) -> R,
{
    let wal = TestWal::memory();
    f(&wal)
}

/// Builds an insert message with a UTF-8 payload.
pub fn insert_message(payload: &str) -> MutableMessage {
    MutableMessage::builder(MessageType::Insert)
        .payload(payload.as_bytes().to_vec())
        .build()
}

/// Builds an insert message tagged with a vchannel.
pub fn vchannel_message(vchannel: &str, payload: &str) -> MutableMessage {
    insert_message(payload).with_vchannel(vchannel)
}

/// Builds a time tick control message.
pub fn time_tick_message(time_tick: u64) -> MutableMessage {
    MutableMessage::builder(MessageType::TimeTick)
        .build()
        .with_time_tick(time_tick)
}

/// Builds `count` insert messages with payloads `"0"`, `"1"`, ...
pub fn numbered_messages(count: usize) -> Vec<MutableMessage> {
    (0..count).map(|i| insert_message(&i.to_string())).collect()
}

/// Returns the payloads of every message in the WAL's backend, as strings.
pub fn backend_payloads(wal: &dyn Wal, backend: &InMemoryBackend) -> Vec<String> {
    debug_assert_eq!(wal.wal_name(), backend.wal_name());
    backend
        .messages()
        .iter()
        .map(|m| String::from_utf8_lossy(m.payload_bytes().as_ref()).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use walstream_message::BasicMessage;
    use walstream_sync::Context;

    #[test]
    fn test_wal_appends_to_its_backend() {
        let wal = TestWal::memory();
        for msg in numbered_messages(3) {
            wal.append(&Context::background(), msg).unwrap();
        }
        assert_eq!(backend_payloads(wal.wal.as_ref(), &wal.backend), vec!["0", "1", "2"]);
    }

    #[test]
    fn helpers_stamp_expected_properties() {
        let msg = vchannel_message("v0", "p");
        assert_eq!(msg.vchannel(), "v0");
        assert_eq!(msg.message_type(), MessageType::Insert);

        let tick = time_tick_message(9);
        assert_eq!(tick.time_tick(), 9);
        assert!(tick.message_type().is_control());
    }

    #[test]
    fn with_test_wal_returns_closure_value() {
        let len = with_test_wal(|wal| {
            wal.append(&Context::background(), insert_message("a")).unwrap();
            wal.backend.len()
        });
        assert_eq!(len, 1);
    }
}
