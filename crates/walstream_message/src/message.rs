//! Mutable and immutable messages.

use crate::id::MessageId;
use crate::properties::{
    decode_i64, decode_u64, encode_i64, encode_u64, is_reserved_key, Properties,
    LAST_CONFIRMED_KEY, LAST_CONFIRMED_USE_MESSAGE_ID, MESSAGE_TYPE_KEY, TIME_TICK_KEY,
    VCHANNEL_KEY, VERSION_KEY,
};
use bytes::Bytes;
use std::fmt;

/// Kind of a message, stored in the `_t` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Missing or unrecognized type.
    Unknown,
    /// Time tick heartbeat.
    TimeTick,
    /// Row insertion.
    Insert,
    /// Row deletion.
    Delete,
    /// Segment flush.
    Flush,
    /// Collection creation.
    CreateCollection,
    /// Collection removal.
    DropCollection,
    /// Partition creation.
    CreatePartition,
    /// Partition removal.
    DropPartition,
}

impl MessageType {
    /// Returns the wire value of the type.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::TimeTick => 1,
            Self::Insert => 2,
            Self::Delete => 3,
            Self::Flush => 4,
            Self::CreateCollection => 5,
            Self::DropCollection => 6,
            Self::CreatePartition => 7,
            Self::DropPartition => 8,
        }
    }

    /// Maps a wire value back to a type; unknown values map to `Unknown`.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::TimeTick,
            2 => Self::Insert,
            3 => Self::Delete,
            4 => Self::Flush,
            5 => Self::CreateCollection,
            6 => Self::DropCollection,
            7 => Self::CreatePartition,
            8 => Self::DropPartition,
            _ => Self::Unknown,
        }
    }

    /// Returns true for control messages that carry no user data.
    #[must_use]
    pub const fn is_control(self) -> bool {
        !matches!(self, Self::Insert | Self::Delete)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::TimeTick => "TimeTick",
            Self::Insert => "Insert",
            Self::Delete => "Delete",
            Self::Flush => "Flush",
            Self::CreateCollection => "CreateCollection",
            Self::DropCollection => "DropCollection",
            Self::CreatePartition => "CreatePartition",
            Self::DropPartition => "DropPartition",
        };
        f.write_str(name)
    }
}

/// Message format version, stored in the `_v` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub i64);

impl Version {
    /// Messages written before versioning existed.
    pub const OLD: Self = Self(0);
    /// First versioned format.
    pub const V1: Self = Self(1);
    /// Current format.
    pub const V2: Self = Self(2);
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Read-only view shared by mutable and immutable messages.
///
/// Implementors only provide the payload and the property bag; every
/// metadata accessor is derived from the reserved properties.
pub trait BasicMessage {
    /// Returns the opaque payload.
    fn payload(&self) -> &[u8];

    /// Returns the property bag.
    fn properties(&self) -> &Properties;

    /// Returns the message type, `Unknown` when absent or unparsable.
    fn message_type(&self) -> MessageType {
        self.properties()
            .get(MESSAGE_TYPE_KEY)
            .and_then(|v| decode_i64(v).ok())
            .map_or(MessageType::Unknown, MessageType::from_i64)
    }

    /// Returns the format version, [`Version::OLD`] when absent.
    ///
    /// # Panics
    ///
    /// Panics if the version property is present but not a decimal integer.
    fn version(&self) -> Version {
        match self.properties().get(VERSION_KEY) {
            None => Version::OLD,
            Some(value) => match decode_i64(value) {
                Ok(v) => Version(v),
                Err(_) => panic!("corrupt message version {value:?} in message properties"),
            },
        }
    }

    /// Returns the virtual channel, or `""` for broadcast messages.
    fn vchannel(&self) -> &str {
        self.properties().get(VCHANNEL_KEY).unwrap_or("")
    }

    /// Returns the time tick.
    ///
    /// # Panics
    ///
    /// Panics if the time tick was never assigned or cannot be decoded.
    fn time_tick(&self) -> u64 {
        let Some(value) = self.properties().get(TIME_TICK_KEY) else {
            panic!("time tick missing from message properties");
        };
        match decode_u64(value) {
            Ok(tt) => tt,
            Err(_) => panic!("corrupt time tick {value:?} in message properties"),
        }
    }

    /// Advisory size estimate: payload length plus property bag estimate.
    fn estimate_size(&self) -> usize {
        self.payload().len() + self.properties().estimate_size()
    }
}

/// A message that has not been appended yet.
///
/// Routing metadata is stamped with the consuming `with_*` methods, each of
/// which may run at most once per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableMessage {
    payload: Bytes,
    properties: Properties,
}

impl MutableMessage {
    /// Creates a message from a payload and a property bag.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, properties: Properties) -> Self {
        Self {
            payload: payload.into(),
            properties,
        }
    }

    /// Starts building a message of the given type.
    #[must_use]
    pub fn builder(message_type: MessageType) -> MessageBuilder {
        MessageBuilder::new(message_type)
    }

    /// Sets the virtual channel.
    ///
    /// # Panics
    ///
    /// Panics if the vchannel is already set.
    #[must_use]
    pub fn with_vchannel(mut self, vchannel: impl Into<String>) -> Self {
        self.set_once(VCHANNEL_KEY, vchannel.into(), "vchannel");
        self
    }

    /// Sets the time tick.
    ///
    /// # Panics
    ///
    /// Panics if the time tick is already set.
    #[must_use]
    pub fn with_time_tick(mut self, time_tick: u64) -> Self {
        self.set_once(TIME_TICK_KEY, encode_u64(time_tick), "time tick");
        self
    }

    /// Sets the last-confirmed reference to an explicit message id.
    ///
    /// # Panics
    ///
    /// Panics if the last-confirmed reference is already set.
    #[must_use]
    pub fn with_last_confirmed(mut self, id: &MessageId) -> Self {
        self.set_once(LAST_CONFIRMED_KEY, id.marshal(), "last confirmed message id");
        self
    }

    /// Sets the last-confirmed reference to the message's own future id.
    ///
    /// # Panics
    ///
    /// Panics if the last-confirmed reference is already set.
    #[must_use]
    pub fn with_last_confirmed_use_message_id(mut self) -> Self {
        self.set_once(
            LAST_CONFIRMED_KEY,
            LAST_CONFIRMED_USE_MESSAGE_ID.to_string(),
            "last confirmed message id",
        );
        self
    }

    /// Binds the backend-assigned id, freezing the message.
    #[must_use]
    pub fn into_immutable(self, id: MessageId) -> ImmutableMessage {
        ImmutableMessage {
            payload: self.payload,
            properties: self.properties,
            id,
        }
    }

    fn set_once(&mut self, key: &str, value: String, what: &str) {
        if self.properties.exists(key) {
            panic!("{what} already set in message properties");
        }
        self.properties.set(key, value);
    }
}

impl BasicMessage for MutableMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// A durably appended message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmutableMessage {
    payload: Bytes,
    properties: Properties,
    id: MessageId,
}

impl ImmutableMessage {
    /// Returns the backend-assigned id.
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.id
    }

    /// Returns the name of the WAL implementation that stored the message.
    #[must_use]
    pub fn wal_name(&self) -> &str {
        self.id.wal_name()
    }

    /// Returns the last-confirmed message id.
    ///
    /// # Panics
    ///
    /// Panics if the reference was never set or cannot be decoded.
    #[must_use]
    pub fn last_confirmed_message_id(&self) -> MessageId {
        match self.try_last_confirmed_message_id() {
            Some(id) => id,
            None => panic!(
                "last confirmed message id missing from properties of message {}",
                self.id
            ),
        }
    }

    /// Returns the last-confirmed message id, or `None` if it was never set.
    ///
    /// # Panics
    ///
    /// Panics if the reference is present but cannot be decoded.
    #[must_use]
    pub fn try_last_confirmed_message_id(&self) -> Option<MessageId> {
        let value = self.properties.get(LAST_CONFIRMED_KEY)?;
        if value == LAST_CONFIRMED_USE_MESSAGE_ID {
            return Some(self.id.clone());
        }
        match MessageId::unmarshal(self.id.wal_name(), value) {
            Ok(id) => Some(id),
            Err(e) => panic!(
                "corrupt last confirmed message id in properties of message {}: {e}",
                self.id
            ),
        }
    }

    /// Returns the payload as shared bytes.
    #[must_use]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }
}

impl BasicMessage for ImmutableMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Builder for [`MutableMessage`].
///
/// Stamps the message type and format version; user properties may not use
/// reserved keys.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    payload: Bytes,
    properties: Properties,
}

impl MessageBuilder {
    /// Creates a builder for a message of the given type.
    #[must_use]
    pub fn new(message_type: MessageType) -> Self {
        let mut properties = Properties::new();
        properties.set(MESSAGE_TYPE_KEY, encode_i64(message_type.as_i64()));
        properties.set(VERSION_KEY, encode_i64(Version::V2.0));
        Self {
            payload: Bytes::new(),
            properties,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Overrides the format version.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.properties.set(VERSION_KEY, encode_i64(version.0));
        self
    }

    /// Adds a user property.
    ///
    /// # Panics
    ///
    /// Panics if `key` is reserved by the message model.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        assert!(
            !is_reserved_key(&key),
            "property key {key:?} is reserved by the message model"
        );
        self.properties.set(key, value);
        self
    }

    /// Builds the message.
    #[must_use]
    pub fn build(self) -> MutableMessage {
        MutableMessage::new(self.payload, self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn insert() -> MutableMessage {
        MutableMessage::builder(MessageType::Insert)
            .payload(b"payload".to_vec())
            .build()
    }

    #[test]
    fn builder_stamps_type_and_version() {
        let msg = insert();
        assert_eq!(msg.message_type(), MessageType::Insert);
        assert_eq!(msg.version(), Version::V2);
        assert_eq!(msg.payload(), b"payload");
    }

    #[test]
    fn bare_message_defaults() {
        let msg = MutableMessage::new(Bytes::from_static(b"x"), Properties::new());
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(msg.version(), Version::OLD);
        assert_eq!(msg.vchannel(), "");
    }

    #[test]
    fn set_once_fields_read_back() {
        let msg = insert().with_vchannel("v0").with_time_tick(99);
        assert_eq!(msg.vchannel(), "v0");
        assert_eq!(msg.time_tick(), 99);
    }

    #[test]
    #[should_panic(expected = "vchannel already set")]
    fn vchannel_twice_panics() {
        let _ = insert().with_vchannel("a").with_vchannel("b");
    }

    #[test]
    #[should_panic(expected = "time tick already set")]
    fn time_tick_twice_panics() {
        let _ = insert().with_time_tick(1).with_time_tick(2);
    }

    #[test]
    #[should_panic(expected = "last confirmed message id already set")]
    fn last_confirmed_twice_panics() {
        let id = MessageId::from_u64("memory", 1);
        let _ = insert()
            .with_last_confirmed(&id)
            .with_last_confirmed_use_message_id();
    }

    #[test]
    #[should_panic(expected = "time tick missing")]
    fn missing_time_tick_panics() {
        let _ = insert().time_tick();
    }

    #[test]
    #[should_panic(expected = "corrupt time tick")]
    fn dirty_time_tick_panics() {
        let mut props = Properties::new();
        props.set(TIME_TICK_KEY, "not-a-number");
        let _ = MutableMessage::new(Bytes::new(), props).time_tick();
    }

    #[test]
    fn into_immutable_binds_id() {
        let id = MessageId::from_u64("memory", 5);
        let msg = insert().with_time_tick(3).into_immutable(id.clone());
        assert_eq!(msg.message_id(), &id);
        assert_eq!(msg.wal_name(), "memory");
        assert_eq!(msg.time_tick(), 3);
    }

    #[test]
    fn last_confirmed_sentinel_resolves_to_own_id() {
        let id = MessageId::from_u64("memory", 8);
        let msg = insert()
            .with_last_confirmed_use_message_id()
            .into_immutable(id.clone());
        assert_eq!(msg.last_confirmed_message_id(), id);
    }

    #[test]
    fn last_confirmed_literal_is_decoded() {
        let confirmed = MessageId::from_u64("memory", 4);
        let msg = insert()
            .with_last_confirmed(&confirmed)
            .into_immutable(MessageId::from_u64("memory", 9));
        assert_eq!(msg.last_confirmed_message_id(), confirmed);
    }

    #[test]
    fn absent_last_confirmed_is_none_on_try() {
        let msg = insert().into_immutable(MessageId::from_u64("memory", 1));
        assert_eq!(msg.try_last_confirmed_message_id(), None);
    }

    #[test]
    #[should_panic(expected = "last confirmed message id missing")]
    fn absent_last_confirmed_panics() {
        let msg = insert().into_immutable(MessageId::from_u64("memory", 1));
        let _ = msg.last_confirmed_message_id();
    }

    #[test]
    #[should_panic(expected = "reserved by the message model")]
    fn builder_rejects_reserved_keys() {
        let _ = MutableMessage::builder(MessageType::Insert).property(TIME_TICK_KEY, "1");
    }

    #[test]
    fn estimate_size_includes_payload_and_properties() {
        let msg = MutableMessage::new(
            Bytes::from_static(b"12345"),
            [("ab", "cd")].into_iter().collect(),
        );
        assert_eq!(msg.estimate_size(), 9);
    }

    #[test]
    fn control_types() {
        assert!(MessageType::TimeTick.is_control());
        assert!(!MessageType::Insert.is_control());
        assert_eq!(MessageType::from_i64(42), MessageType::Unknown);
    }

    proptest! {
        #[test]
        fn time_tick_reads_back(tt in any::<u64>(), vchannel in "[a-z0-9_]{0,24}") {
            let msg = insert().with_time_tick(tt).with_vchannel(vchannel.clone());
            prop_assert_eq!(msg.time_tick(), tt);
            prop_assert_eq!(msg.vchannel(), vchannel.as_str());
        }

        #[test]
        fn type_wire_value_roundtrips(value in 0i64..9) {
            prop_assert_eq!(MessageType::from_i64(value).as_i64(), value);
        }
    }
}
