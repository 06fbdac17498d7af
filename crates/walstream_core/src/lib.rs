//! # walstream core
//!
//! Turns a raw log backend into a governed write-ahead log.
//!
//! This crate provides:
//! - [`Wal`] - the append/read/close surface producers and consumers use
//! - [`adapt_backend_to_wal`] - builds a [`WalAdaptor`] over any
//!   [`WalBackend`](walstream_storage::WalBackend)
//! - [`Interceptor`] and [`InterceptorChain`] - append-path middleware with
//!   readiness gating and result rewriting
//! - [`WalScanner`] and [`ScannerRegistry`] - uniquely named read cursors
//! - [`WalConfig`] and [`WalStats`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use walstream_core::{adapt_backend_to_wal, ReadOptions, Wal, WalConfig};
//! use walstream_message::{MessageType, MutableMessage};
//! use walstream_storage::{ChannelInfo, InMemoryBackend};
//! use walstream_sync::Context;
//!
//! let backend = Arc::new(InMemoryBackend::new(ChannelInfo::new("events", 1)));
//! let wal = adapt_backend_to_wal(backend.clone(), vec![], None, WalConfig::default()).unwrap();
//! let ctx = Context::background();
//!
//! let msg = MutableMessage::builder(MessageType::Insert).payload(b"row".to_vec()).build();
//! let result = wal.append(&ctx, msg).unwrap();
//!
//! backend.seal();
//! let scanner = wal.read(&ctx, ReadOptions::earliest()).unwrap();
//! let first = scanner.next(&ctx).unwrap().unwrap();
//! assert_eq!(first.message_id(), &result.message_id);
//!
//! wal.close();
//! assert!(wal.append(&ctx, MutableMessage::builder(MessageType::Insert).build())
//!     .unwrap_err()
//!     .is_shutdown());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod interceptor;
pub mod scanner;
mod stats;
mod wal;

pub use config::{WalConfig, DEFAULT_APPEND_POOL_SIZE, DEFAULT_SCANNER_NAME_ATTEMPTS};
pub use error::{WalError, WalResult};
pub use interceptor::{
    AppendFn, AppendResultRewriter, Interceptor, InterceptorBuildParam, InterceptorBuilder,
    InterceptorChain,
};
pub use scanner::{MessageFilter, Messages, ReadOptions, ScannerRegistry, WalScanner};
pub use stats::{WalStats, WalStatsSnapshot};
pub use wal::{adapt_backend_to_wal, AppendCallback, AppendResult, CleanupHook, Wal, WalAdaptor};
