//! A value published once, after the fact.

use crate::context::{Context, ContextError};
use crate::signal::Signal;
use crossbeam::channel::Receiver;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A handle to a value that does not exist yet.
///
/// The producer calls [`Deferred::set`] exactly once; consumers block on
/// [`Deferred::get`] or poll [`Deferred::try_get`]. Clones share the same
/// slot.
pub struct Deferred<T> {
    inner: Arc<DeferredInner<T>>,
}

struct DeferredInner<T> {
    value: OnceLock<T>,
    ready: Signal,
}

impl<T> Deferred<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DeferredInner {
                value: OnceLock::new(),
                ready: Signal::new(),
            }),
        }
    }

    /// Publishes the value and wakes every waiter.
    ///
    /// # Panics
    ///
    /// Panics if a value was already published.
    pub fn set(&self, value: T) {
        if self.inner.value.set(value).is_err() {
            panic!("deferred value published twice");
        }
        self.inner.ready.fire();
    }

    /// Returns true once the value has been published.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// Receiver that disconnects once the value is published.
    #[must_use]
    pub fn ready(&self) -> Receiver<()> {
        self.inner.ready.done()
    }
}

impl<T: Clone> Deferred<T> {
    /// Returns the value if it has been published.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.inner.value.get().cloned()
    }

    /// Blocks until the value is published.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.ready.wait();
        match self.inner.value.get() {
            Some(value) => value.clone(),
            None => unreachable!("deferred signal fired before its value was set"),
        }
    }

    /// Blocks until the value is published or the context ends.
    ///
    /// # Errors
    ///
    /// Returns the [`ContextError`] that ended the wait.
    pub fn get_with(&self, ctx: &Context) -> Result<T, ContextError> {
        if let Some(value) = self.try_get() {
            return Ok(value);
        }
        ctx.wait(&self.ready())?;
        Ok(self.get())
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn get_blocks_until_set() {
        let slot: Deferred<u32> = Deferred::new();
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.set(7);
        });
        assert_eq!(slot.get(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn try_get_before_and_after() {
        let slot = Deferred::new();
        assert_eq!(slot.try_get(), None);
        slot.set("ready".to_string());
        assert_eq!(slot.try_get().as_deref(), Some("ready"));
        assert!(slot.is_set());
    }

    #[test]
    #[should_panic(expected = "published twice")]
    fn second_set_panics() {
        let slot = Deferred::new();
        slot.set(1);
        slot.set(2);
    }

    #[test]
    fn get_with_honours_deadline() {
        let slot: Deferred<u8> = Deferred::new();
        let ctx = Context::background().with_timeout(Duration::from_millis(5));
        assert_eq!(slot.get_with(&ctx), Err(ContextError::DeadlineExceeded));
    }
}
