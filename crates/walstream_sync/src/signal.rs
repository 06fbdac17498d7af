//! One-shot broadcast signal.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A signal that fires at most once and stays fired.
///
/// Waiters hold a [`Receiver`] obtained from [`Signal::done`]; nothing is
/// ever sent on it. Firing drops the only sender, which disconnects the
/// channel and wakes every current and future receiver. This makes the
/// signal composable with `crossbeam::select!`.
///
/// Clones share the same underlying signal.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl Signal {
    /// Creates an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            inner: Arc::new(SignalInner {
                trigger: Mutex::new(Some(tx)),
                done: rx,
            }),
        }
    }

    /// Creates a signal that has already fired.
    #[must_use]
    pub fn fired() -> Self {
        let signal = Self::new();
        signal.fire();
        signal
    }

    /// Fires the signal. Returns `true` if this call fired it.
    pub fn fire(&self) -> bool {
        self.inner.trigger.lock().take().is_some()
    }

    /// Returns true once the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.trigger.lock().is_none()
    }

    /// Returns a receiver that becomes disconnected when the signal fires.
    #[must_use]
    pub fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }

    /// Blocks until the signal fires.
    pub fn wait(&self) {
        // Nothing is ever sent; recv only returns once the sender is dropped.
        let _ = self.inner.done.recv();
    }

    /// Blocks until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(
            self.inner.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .finish()
    }
}
