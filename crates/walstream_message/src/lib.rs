//! # walstream message
//!
//! The message model shared by every walstream crate.
//!
//! A message starts life as a [`MutableMessage`]: an opaque payload plus a
//! [`Properties`] bag. Producers and interceptors stamp the routing metadata
//! (virtual channel, time tick, last-confirmed reference) onto it, each field
//! exactly once. When a backend durably appends the message it binds the
//! backend-assigned [`MessageId`] and the message becomes an
//! [`ImmutableMessage`], which exposes no setters at all.
//!
//! ## Invariants
//!
//! - vchannel, time tick and last-confirmed are single-assignment; setting
//!   one twice is a bug in the caller and panics
//! - time tick and last-confirmed are assumed present once read; reading a
//!   missing or corrupt value panics
//! - an absent vchannel is meaningful (broadcast) and reads as `""`
//!
//! ## Example
//!
//! ```rust
//! use walstream_message::{BasicMessage, MessageId, MessageType, MutableMessage};
//!
//! let msg = MutableMessage::builder(MessageType::Insert)
//!     .payload(b"row data".to_vec())
//!     .build()
//!     .with_vchannel("by-dev-rootcoord-dml_0_v0")
//!     .with_time_tick(42)
//!     .with_last_confirmed_use_message_id();
//!
//! let id = MessageId::from_u64("memory", 7);
//! let msg = msg.into_immutable(id.clone());
//! assert_eq!(msg.time_tick(), 42);
//! assert_eq!(msg.last_confirmed_message_id(), id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod message;
mod properties;

pub use error::{MessageError, MessageResult};
pub use id::MessageId;
pub use message::{
    BasicMessage, ImmutableMessage, MessageBuilder, MessageType, MutableMessage, Version,
};
pub use properties::{
    decode_i64, decode_u64, encode_i64, encode_u64, is_reserved_key, Properties,
    LAST_CONFIRMED_KEY, LAST_CONFIRMED_USE_MESSAGE_ID, MESSAGE_TYPE_KEY, TIME_TICK_KEY,
    VCHANNEL_KEY, VERSION_KEY,
};
