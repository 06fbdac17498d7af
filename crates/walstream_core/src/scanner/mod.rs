//! Read cursors and their per-channel registry.
//!
//! Every scanner handed out by a WAL carries a name unique among the
//! channel's open scanners and a numeric id used for bookkeeping. The WAL
//! tracks each scanner until the scanner's cleanup runs, which happens
//! exactly once, on its first `close`.

mod registry;
mod wal_scanner;

pub use registry::{NameGenerator, ScannerRegistry};
pub use wal_scanner::{Messages, WalScanner};

use std::fmt;
use std::sync::Arc;
use walstream_message::{ImmutableMessage, MessageId};
use walstream_storage::DeliverPolicy;

/// Predicate deciding which messages a scanner yields.
pub type MessageFilter = Arc<dyn Fn(&ImmutableMessage) -> bool + Send + Sync>;

/// Options for [`Wal::read`](crate::Wal::read).
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Where the scanner starts.
    pub deliver_policy: DeliverPolicy,
    /// Messages failing the filter are skipped.
    pub filter: Option<MessageFilter>,
}

impl ReadOptions {
    /// Reads from the first message the backend holds.
    #[must_use]
    pub fn earliest() -> Self {
        Self::default()
    }

    /// Reads only messages appended after the scanner opens.
    #[must_use]
    pub fn latest() -> Self {
        Self::with_policy(DeliverPolicy::Latest)
    }

    /// Reads from `id`, inclusive.
    #[must_use]
    pub fn start_from(id: MessageId) -> Self {
        Self::with_policy(DeliverPolicy::StartFrom(id))
    }

    /// Reads from the message after `id`.
    #[must_use]
    pub fn start_after(id: MessageId) -> Self {
        Self::with_policy(DeliverPolicy::StartAfter(id))
    }

    /// Reads with an explicit deliver policy.
    #[must_use]
    pub fn with_policy(deliver_policy: DeliverPolicy) -> Self {
        Self {
            deliver_policy,
            filter: None,
        }
    }

    /// Only yields messages for which `filter` returns true.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ImmutableMessage) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("deliver_policy", &self.deliver_policy)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
