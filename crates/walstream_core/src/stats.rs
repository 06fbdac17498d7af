//! WAL statistics.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use walstream_core::{adapt_backend_to_wal, Wal, WalConfig};
//! use walstream_message::{MessageType, MutableMessage};
//! use walstream_storage::{ChannelInfo, InMemoryBackend};
//! use walstream_sync::Context;
//!
//! let backend = Arc::new(InMemoryBackend::new(ChannelInfo::new("events", 1)));
//! let wal = adapt_backend_to_wal(backend, vec![], None, WalConfig::default()).unwrap();
//! let msg = MutableMessage::builder(MessageType::Insert).build();
//! wal.append(&Context::background(), msg).unwrap();
//!
//! let stats = wal.stats();
//! assert_eq!(stats.appends, 1);
//! wal.close();
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a WAL adaptor.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct WalStats {
    /// Successful appends, sync or async.
    appends: AtomicU64,
    /// Appends that returned an error after admission.
    append_failures: AtomicU64,
    /// Appends submitted through `append_async`.
    async_appends: AtomicU64,
    /// Appends and reads refused because the WAL was shutting down.
    rejected: AtomicU64,
    /// Estimated bytes of successfully appended messages.
    bytes_appended: AtomicU64,
    /// Scanners handed out by `read`.
    scanners_opened: AtomicU64,
    /// Scanners whose cleanup has run.
    scanners_closed: AtomicU64,
}

impl WalStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, bytes: u64) {
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_append_failure(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_async_append(&self) {
        self.async_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scanner_opened(&self) {
        self.scanners_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scanner_closed(&self) {
        self.scanners_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of successful appends.
    pub fn appends(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    /// Returns the number of failed appends.
    pub fn append_failures(&self) -> u64 {
        self.append_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of appends submitted asynchronously.
    pub fn async_appends(&self) -> u64 {
        self.async_appends.load(Ordering::Relaxed)
    }

    /// Returns the number of calls refused during shutdown.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Returns the estimated bytes appended.
    pub fn bytes_appended(&self) -> u64 {
        self.bytes_appended.load(Ordering::Relaxed)
    }

    /// Returns the number of scanners opened.
    pub fn scanners_opened(&self) -> u64 {
        self.scanners_opened.load(Ordering::Relaxed)
    }

    /// Returns the number of scanners closed.
    pub fn scanners_closed(&self) -> u64 {
        self.scanners_closed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> WalStatsSnapshot {
        WalStatsSnapshot {
            appends: self.appends(),
            append_failures: self.append_failures(),
            async_appends: self.async_appends(),
            rejected: self.rejected(),
            bytes_appended: self.bytes_appended(),
            scanners_opened: self.scanners_opened(),
            scanners_closed: self.scanners_closed(),
        }
    }
}

/// A point-in-time copy of [`WalStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WalStatsSnapshot {
    /// Successful appends.
    pub appends: u64,
    /// Failed appends.
    pub append_failures: u64,
    /// Appends submitted asynchronously.
    pub async_appends: u64,
    /// Calls refused during shutdown.
    pub rejected: u64,
    /// Estimated bytes appended.
    pub bytes_appended: u64,
    /// Scanners opened.
    pub scanners_opened: u64,
    /// Scanners closed.
    pub scanners_closed: u64,
}

impl WalStatsSnapshot {
    /// Scanners opened but not yet closed.
    #[must_use]
    pub fn open_scanners(&self) -> u64 {
        self.scanners_opened.saturating_sub(self.scanners_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = WalStats::new();
        assert_eq!(stats.snapshot(), WalStatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = WalStats::new();
        stats.record_append(100);
        stats.record_append(50);
        stats.record_append_failure();
        stats.record_async_append();
        stats.record_rejected();

        let snap = stats.snapshot();
        assert_eq!(snap.appends, 2);
        assert_eq!(snap.bytes_appended, 150);
        assert_eq!(snap.append_failures, 1);
        assert_eq!(snap.async_appends, 1);
        assert_eq!(snap.rejected, 1);
    }

    #[test]
    fn open_scanners_tracks_difference() {
        let stats = WalStats::new();
        stats.record_scanner_opened();
        stats.record_scanner_opened();
        stats.record_scanner_closed();
        assert_eq!(stats.snapshot().open_scanners(), 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(WalStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_append(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.appends(), 1000);
        assert_eq!(stats.bytes_appended(), 1000);
    }
}
