//! Per-channel directory of open scanners.

use super::WalScanner;
use crate::error::{WalError, WalResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use walstream_storage::ChannelInfo;

/// Produces candidate scanner names for a channel.
pub type NameGenerator = Box<dyn Fn(&ChannelInfo) -> String + Send + Sync>;

/// Tracks open scanners and hands out unique names and ids.
///
/// # Invariants
///
/// - No two reserved names are equal
/// - A name stays reserved until its scanner is deregistered or the
///   reservation is released
/// - Ids are never reused
pub struct ScannerRegistry {
    channel: ChannelInfo,
    attempts: usize,
    generate: NameGenerator,
    next_id: AtomicI64,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    scanners: HashMap<i64, Arc<WalScanner>>,
    names: HashSet<String>,
}

/// Default generator: `{channel}/{term}/{uuid}`.
fn default_name(channel: &ChannelInfo) -> String {
    format!("{}/{}/{}", channel.name, channel.term, Uuid::new_v4())
}

impl ScannerRegistry {
    /// Creates a registry using random names.
    #[must_use]
    pub fn new(channel: ChannelInfo, attempts: usize) -> Self {
        Self::with_name_generator(channel, attempts, Box::new(default_name))
    }

    /// Creates a registry with a custom name generator.
    #[must_use]
    pub fn with_name_generator(
        channel: ChannelInfo,
        attempts: usize,
        generate: NameGenerator,
    ) -> Self {
        Self {
            channel,
            attempts,
            generate,
            next_id: AtomicI64::new(1),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Reserves a name no open scanner uses.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::ScannerNameExhausted`] if every attempt collided.
    pub fn allocate_scanner_name(&self) -> WalResult<String> {
        let mut inner = self.inner.lock();
        for _ in 0..self.attempts {
            let name = (self.generate)(&self.channel);
            if !inner.names.contains(&name) {
                inner.names.insert(name.clone());
                return Ok(name);
            }
        }
        Err(WalError::ScannerNameExhausted {
            channel: self.channel.name.clone(),
            attempts: self.attempts,
        })
    }

    /// Releases a reserved name that never got a scanner.
    pub fn release_name(&self, name: &str) {
        self.inner.lock().names.remove(name);
    }

    /// Allocates the next scanner id.
    pub fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Tracks a scanner under `id`.
    pub fn register(&self, id: i64, scanner: Arc<WalScanner>) {
        let mut inner = self.inner.lock();
        inner.names.insert(scanner.name().to_string());
        inner.scanners.insert(id, scanner);
    }

    /// Stops tracking the scanner under `id` and frees its name.
    pub fn deregister(&self, id: i64) -> Option<Arc<WalScanner>> {
        let mut inner = self.inner.lock();
        let scanner = inner.scanners.remove(&id)?;
        inner.names.remove(scanner.name());
        Some(scanner)
    }

    /// Returns the tracked scanners, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(i64, Arc<WalScanner>)> {
        let inner = self.inner.lock();
        let mut scanners: Vec<_> = inner
            .scanners
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();
        scanners.sort_by_key(|(id, _)| *id);
        scanners
    }

    /// Returns true if `name` is reserved.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.lock().names.contains(name)
    }

    /// Number of tracked scanners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().scanners.len()
    }

    /// Returns true when no scanner is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The channel this registry serves.
    #[must_use]
    pub fn channel(&self) -> &ChannelInfo {
        &self.channel
    }
}

impl fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ScannerRegistry")
            .field("channel", &self.channel)
            .field("scanners", &inner.scanners.len())
            .field("reserved_names", &inner.names.len())
            .finish()
    }
}
