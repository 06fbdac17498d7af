//! # walstream storage
//!
//! The raw log primitive underneath a walstream WAL.
//!
//! A backend is bound to one channel. It appends messages, assigns each a
//! [`MessageId`](walstream_message::MessageId) and serves cursors over what
//! it holds. Backends know nothing about interceptors, lifecycles or scanner
//! registries; the adaptor in `walstream_core` layers those on top.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - sequential ids, for tests and ephemeral channels
//!
//! ## Example
//!
//! ```rust
//! use walstream_message::{MessageType, MutableMessage};
//! use walstream_storage::{
//!     BackendReadOptions, ChannelInfo, DeliverPolicy, InMemoryBackend, WalBackend,
//! };
//! use walstream_sync::Context;
//!
//! let ctx = Context::background();
//! let backend = InMemoryBackend::new(ChannelInfo::new("events", 1));
//! let msg = MutableMessage::builder(MessageType::Insert).payload(b"hi".to_vec()).build();
//! let id = backend.append(&ctx, msg).unwrap();
//! assert_eq!(id.as_u64(), Some(1));
//!
//! backend.seal();
//! let cursor = backend
//!     .read(&ctx, BackendReadOptions::new("reader", DeliverPolicy::Earliest))
//!     .unwrap();
//! assert_eq!(cursor.next(&ctx).unwrap().unwrap().message_id(), &id);
//! assert!(cursor.next(&ctx).unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;

pub use backend::{BackendReadOptions, BackendScanner, ChannelInfo, DeliverPolicy, WalBackend};
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryBackend, MEMORY_WAL_NAME};
