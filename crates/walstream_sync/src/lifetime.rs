//! Admission gate for a component that shuts down gracefully.
//!
//! # Invariants
//!
//! - State only moves forward: `Working -> Stopped -> Closed`.
//! - [`Lifetime::add`] succeeds only while `Working`.
//! - [`Lifetime::wait`] returns once every [`Admission`] issued before the
//!   state left `Working` has been dropped.

use crate::signal::Signal;
use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Lifecycle state of a guarded component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifetimeState {
    /// Accepting new operations.
    Working,
    /// Refusing new operations; in-flight ones are draining.
    Stopped,
    /// Fully shut down.
    Closed,
}

impl fmt::Display for LifetimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Working => "working",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Returned when an operation is refused admission.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeError {
    /// The component is no longer accepting work.
    #[error("lifetime is {state}, not accepting work")]
    NotWorking {
        /// State at the time of the refused call.
        state: LifetimeState,
    },
}

struct LifetimeInner {
    gate: Mutex<Gate>,
    drained: Condvar,
    closed: Signal,
}

struct Gate {
    state: LifetimeState,
    in_flight: usize,
}

/// Tracks in-flight operations and the owning component's state.
///
/// Clones share the same gate.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<LifetimeInner>,
}

/// Proof that an operation was admitted. Dropping it marks the operation done.
#[must_use = "dropping an admission immediately marks the operation finished"]
pub struct Admission {
    inner: Arc<LifetimeInner>,
}

impl Lifetime {
    /// Creates a gate in the `Working` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LifetimeInner {
                gate: Mutex::new(Gate {
                    state: LifetimeState::Working,
                    in_flight: 0,
                }),
                drained: Condvar::new(),
                closed: Signal::new(),
            }),
        }
    }

    /// Admits one operation.
    ///
    /// # Errors
    ///
    /// Returns [`LifetimeError::NotWorking`] once the state left `Working`.
    pub fn add(&self) -> Result<Admission, LifetimeError> {
        let mut gate = self.inner.gate.lock();
        if gate.state != LifetimeState::Working {
            return Err(LifetimeError::NotWorking { state: gate.state });
        }
        gate.in_flight += 1;
        Ok(Admission {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Moves the state forward. Backward transitions are ignored.
    pub fn set_state(&self, state: LifetimeState) {
        let mut gate = self.inner.gate.lock();
        if state <= gate.state {
            return;
        }
        gate.state = state;
        drop(gate);
        if state == LifetimeState::Closed {
            self.inner.closed.fire();
        }
    }

    /// Shorthand for `set_state(LifetimeState::Closed)`.
    pub fn close(&self) {
        self.set_state(LifetimeState::Closed);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifetimeState {
        self.inner.gate.lock().state
    }

    /// Number of admitted operations not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.gate.lock().in_flight
    }

    /// Returns true once the state is `Closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_fired()
    }

    /// Receiver that disconnects once the state is `Closed`.
    #[must_use]
    pub fn closed(&self) -> Receiver<()> {
        self.inner.closed.done()
    }

    /// Blocks until no admitted operation remains.
    pub fn wait(&self) {
        let mut gate = self.inner.gate.lock();
        while gate.in_flight > 0 {
            self.inner.drained.wait(&mut gate);
        }
    }

    /// Like [`Lifetime::wait`] with an upper bound. Returns `true` if drained.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.inner.gate.lock();
        while gate.in_flight > 0 {
            if self
                .inner
                .drained
                .wait_until(&mut gate, deadline)
                .timed_out()
            {
                return gate.in_flight == 0;
            }
        }
        true
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.inner.gate.lock();
        f.debug_struct("Lifetime")
            .field("state", &gate.state)
            .field("in_flight", &gate.in_flight)
            .finish()
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        let mut gate = self.inner.gate.lock();
        gate.in_flight -= 1;
        if gate.in_flight == 0 {
            self.inner.drained.notify_all();
        }
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn add_refused_after_stop() {
        let lifetime = Lifetime::new();
        let admission = lifetime.add().unwrap();
        lifetime.set_state(LifetimeState::Stopped);
        assert_eq!(
            lifetime.add().unwrap_err(),
            LifetimeError::NotWorking {
                state: LifetimeState::Stopped
            }
        );
        drop(admission);
        assert_eq!(lifetime.in_flight(), 0);
    }

    #[test]
    fn state_never_moves_backward() {
        let lifetime = Lifetime::new();
        lifetime.close();
        lifetime.set_state(LifetimeState::Working);
        assert_eq!(lifetime.state(), LifetimeState::Closed);
        assert!(lifetime.is_closed());
    }

    #[test]
    fn wait_blocks_until_admissions_drop() {
        let lifetime = Lifetime::new();
        let admission = lifetime.add().unwrap();
        lifetime.set_state(LifetimeState::Stopped);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(admission);
        });

        let start = Instant::now();
        lifetime.wait();
        assert!(start.elapsed() >= Duration::from_millis(15));
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_reports_undrained() {
        let lifetime = Lifetime::new();
        let _admission = lifetime.add().unwrap();
        assert!(!lifetime.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_with_nothing_in_flight_returns() {
        let lifetime = Lifetime::new();
        lifetime.set_state(LifetimeState::Stopped);
        lifetime.wait();
        assert!(lifetime.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn closed_receiver_disconnects_on_close() {
        let lifetime = Lifetime::new();
        let closed = lifetime.closed();
        lifetime.set_state(LifetimeState::Stopped);
        assert!(closed.try_recv().is_err());
        assert!(!lifetime.is_closed());
        lifetime.close();
        assert!(closed.recv().is_err());
    }
}
