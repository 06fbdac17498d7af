//! Cooperative cancellation.
//!
//! A [`Context`] travels with every blocking call. It carries a cancellation
//! [`Signal`] and an optional deadline; blocking code selects over the event
//! it is waiting for, the cancellation signal and the deadline.
//!
//! ```rust
//! use std::time::Duration;
//! use walstream_sync::{Context, ContextError, Signal};
//!
//! let (ctx, cancel) = Context::cancellable();
//! let never = Signal::new();
//! cancel.cancel();
//! assert_eq!(ctx.wait(&never.done()), Err(ContextError::Cancelled));
//!
//! let ctx = Context::background().with_timeout(Duration::from_millis(5));
//! assert_eq!(ctx.wait(&never.done()), Err(ContextError::DeadlineExceeded));
//! ```

use crate::signal::Signal;
use crossbeam::channel::{self, Receiver};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a context stopped admitting work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context was cancelled through its [`CancelHandle`].
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation scope passed to blocking operations.
///
/// Contexts derived with [`Context::with_timeout`] or
/// [`Context::with_deadline`] share the parent's cancellation signal and
/// keep the earlier of the two deadlines.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: Signal,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Signal,
}

impl CancelHandle {
    /// Cancels the context. Idempotent.
    pub fn cancel(&self) {
        self.signal.fire();
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            cancel: Signal::new(),
            deadline: None,
        }
    }

    /// A context paired with the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let ctx = Self::background();
        let handle = CancelHandle {
            signal: ctx.cancel.clone(),
        };
        (ctx, handle)
    }

    /// Derives a context whose deadline is at most `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context whose deadline is at most `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    ///
    /// Cancellation takes precedence over an expired deadline.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_fired() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Receiver that disconnects when the context is cancelled.
    ///
    /// Does not observe the deadline; pair it with
    /// [`Context::deadline_channel`].
    #[must_use]
    pub fn done(&self) -> Receiver<()> {
        self.cancel.done()
    }

    /// Receiver that yields once the deadline passes; never yields without one.
    #[must_use]
    pub fn deadline_channel(&self) -> Receiver<Instant> {
        match self.deadline {
            Some(d) => channel::at(d),
            None => channel::never(),
        }
    }

    /// Blocks until `event` disconnects or the context is done.
    ///
    /// A context that is already done fails immediately, even if `event`
    /// has fired too.
    ///
    /// # Errors
    ///
    /// Returns the [`ContextError`] that ended the wait.
    pub fn wait(&self, event: &Receiver<()>) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let done = self.done();
        let deadline = self.deadline_channel();
        crossbeam::select! {
            recv(event) -> _ => Ok(()),
            recv(done) -> _ => Err(ContextError::Cancelled),
            recv(deadline) -> _ => Err(ContextError::DeadlineExceeded),
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    ///
    /// # Errors
    ///
    /// Returns the [`ContextError`] that cut the sleep short.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let done = self.done();
        let deadline = self.deadline_channel();
        let timer = channel::after(duration);
        crossbeam::select! {
            recv(timer) -> _ => Ok(()),
            recv(done) -> _ => Err(ContextError::Cancelled),
            recv(deadline) -> _ => Err(ContextError::DeadlineExceeded),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn wait_returns_when_event_fires() {
        let ctx = Context::background();
        let event = Signal::new();
        let trigger = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            trigger.fire();
        });
        assert_eq!(ctx.wait(&event.done()), Ok(()));
        handle.join().unwrap();
    }

    #[test]
    fn cancel_wakes_a_blocked_wait() {
        let (ctx, cancel) = Context::cancellable();
        let event = Signal::new();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            cancel.cancel();
        });
        assert_eq!(ctx.wait(&event.done()), Err(ContextError::Cancelled));
        handle.join().unwrap();
    }

    #[test]
    fn deadline_bounds_a_wait() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let event = Signal::new();
        let start = Instant::now();
        assert_eq!(ctx.wait(&event.done()), Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn derived_context_keeps_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn derived_context_shares_cancellation() {
        let (parent, cancel) = Context::cancellable();
        let child = parent.with_timeout(Duration::from_secs(60));
        cancel.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn cancelled_context_fails_fast_even_if_event_fired() {
        let (ctx, cancel) = Context::cancellable();
        cancel.cancel();
        let event = Signal::fired();
        assert_eq!(ctx.wait(&event.done()), Err(ContextError::Cancelled));
    }

    #[test]
    fn sleep_completes_without_cancellation() {
        let ctx = Context::background();
        assert_eq!(ctx.sleep(Duration::from_millis(1)), Ok(()));
    }
}
