//! # walstream testkit
//!
//! Test utilities for walstream.
//!
//! This crate provides:
//! - Fixtures that build a WAL over an in-memory backend
//! - A fault-injecting backend wrapper
//! - Sample interceptors covering the readiness, rejection and
//!   result-rewriting hooks
//! - Property-based generators using proptest
//! - Concurrent stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use walstream_testkit::prelude::*;
//! use walstream_core::Wal;
//! use walstream_sync::Context;
//!
//! let wal = TestWal::memory();
//! let result = wal.append(&Context::background(), insert_message("row")).unwrap();
//! assert_eq!(result.message_id.as_u64(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod interceptors;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::interceptors::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use interceptors::*;
pub use stress::*;
