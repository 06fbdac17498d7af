//! Backend-assigned message identifiers.

use crate::error::{MessageError, MessageResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to a message by the backend that durably stored it.
///
/// The raw bytes are opaque to everything above the backend. Two ids are only
/// comparable when they come from the same WAL implementation; comparing ids
/// across implementations yields `None`.
///
/// Backends that number messages sequentially should use
/// [`MessageId::from_u64`], which stores the value big-endian so that byte
/// order and numeric order agree.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    wal_name: Arc<str>,
    raw: Bytes,
}

impl MessageId {
    /// Creates a message id from raw backend bytes.
    #[must_use]
    pub fn new(wal_name: impl Into<Arc<str>>, raw: impl Into<Bytes>) -> Self {
        Self {
            wal_name: wal_name.into(),
            raw: raw.into(),
        }
    }

    /// Creates a message id from a sequence number.
    #[must_use]
    pub fn from_u64(wal_name: impl Into<Arc<str>>, value: u64) -> Self {
        Self::new(wal_name, value.to_be_bytes().to_vec())
    }

    /// Returns the name of the WAL implementation that issued this id.
    #[must_use]
    pub fn wal_name(&self) -> &str {
        &self.wal_name
    }

    /// Returns the raw id bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Interprets the id as a sequence number.
    ///
    /// Returns `None` if the raw id is not exactly 8 bytes.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.raw.as_ref().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Encodes the id for storage in a property bag.
    #[must_use]
    pub fn marshal(&self) -> String {
        STANDARD.encode(&self.raw)
    }

    /// Decodes an id previously produced by [`MessageId::marshal`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidMessageId`] if the value is not valid
    /// base64.
    pub fn unmarshal(wal_name: impl Into<Arc<str>>, encoded: &str) -> MessageResult<Self> {
        let wal_name = wal_name.into();
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| MessageError::invalid_message_id(wal_name.as_ref(), e.to_string()))?;
        Ok(Self::new(wal_name, raw))
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.wal_name != other.wal_name {
            return None;
        }
        Some(self.raw.cmp(&other.raw))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u64() {
            Some(seq) => write!(f, "{}:{}", self.wal_name, seq),
            None => write!(f, "{}:{}", self.wal_name, self.marshal()),
        }
    }
}
