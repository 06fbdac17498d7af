//! # walstream sync
//!
//! Synchronization building blocks used by the WAL adaptor and its backends.
//!
//! - [`Signal`] - a one-shot broadcast that many threads can wait on
//! - [`Context`] - cooperative cancellation plus an optional deadline
//! - [`Deferred`] - a value published exactly once, after construction
//! - [`Lifetime`] - admission gate with graceful drain on shutdown
//! - [`WorkerPool`] - fixed-size thread pool with an unbounded queue
//!
//! Every blocking wait in walstream is expressed as a `crossbeam::select!`
//! over the awaited [`Signal`], the context's cancellation signal and the
//! context's deadline.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod deferred;
mod lifetime;
mod pool;
mod signal;

pub use context::{CancelHandle, Context, ContextError};
pub use deferred::Deferred;
pub use lifetime::{Admission, Lifetime, LifetimeError, LifetimeState};
pub use pool::{PoolError, WorkerPool};
pub use signal::Signal;
