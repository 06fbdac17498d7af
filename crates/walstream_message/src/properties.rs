//! The message property bag and its value codecs.

use crate::error::{MessageError, MessageResult};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Property key holding the message type.
pub const MESSAGE_TYPE_KEY: &str = "_t";
/// Property key holding the message format version.
pub const VERSION_KEY: &str = "_v";
/// Property key holding the virtual channel.
pub const VCHANNEL_KEY: &str = "_vc";
/// Property key holding the time tick.
pub const TIME_TICK_KEY: &str = "_tt";
/// Property key holding the last-confirmed message reference.
pub const LAST_CONFIRMED_KEY: &str = "_lc";
/// Last-confirmed value meaning "the message's own id".
pub const LAST_CONFIRMED_USE_MESSAGE_ID: &str = "use_message_id";

const RESERVED_KEYS: [&str; 5] = [
    MESSAGE_TYPE_KEY,
    VERSION_KEY,
    VCHANNEL_KEY,
    TIME_TICK_KEY,
    LAST_CONFIRMED_KEY,
];

/// Returns true if `key` is managed by the message model itself.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Ordered string-to-string property bag attached to every message.
///
/// Keys are unique; iteration order is key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    /// Creates an empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the bag holds no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Estimated in-memory size of the bag: the sum of key and value lengths.
    #[must_use]
    pub fn estimate_size(&self) -> usize {
        self.0.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Properties {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Properties {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Encodes an unsigned integer property value.
#[must_use]
pub fn encode_u64(value: u64) -> String {
    value.to_string()
}

/// Decodes an unsigned integer property value.
///
/// # Errors
///
/// Returns [`MessageError::InvalidInteger`] if the value is not a decimal
/// `u64`.
pub fn decode_u64(value: &str) -> MessageResult<u64> {
    value
        .parse()
        .map_err(|_| MessageError::invalid_integer(value))
}

/// Encodes a signed integer property value.
#[must_use]
pub fn encode_i64(value: i64) -> String {
    value.to_string()
}

/// Decodes a signed integer property value.
///
/// # Errors
///
/// Returns [`MessageError::InvalidInteger`] if the value is not a decimal
/// `i64`.
pub fn decode_i64(value: &str) -> MessageResult<i64> {
    value
        .parse()
        .map_err(|_| MessageError::invalid_integer(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn set_replaces_and_returns_previous() {
        let mut props = Properties::new();
        assert_eq!(props.set("k", "a"), None);
        assert_eq!(props.set("k", "b"), Some("a".to_string()));
        assert_eq!(props.get("k"), Some("b"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let props: Properties = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn estimate_counts_keys_and_values() {
        let props: Properties = [("ab", "cde"), ("f", "")].into_iter().collect();
        assert_eq!(props.estimate_size(), 6);
    }

    #[test]
    fn reserved_keys() {
        assert!(is_reserved_key(TIME_TICK_KEY));
        assert!(is_reserved_key("_vc"));
        assert!(!is_reserved_key("user_key"));
    }

    #[test]
    fn decode_rejects_non_decimal() {
        assert!(decode_u64("0x10").is_err());
        assert!(decode_u64("-1").is_err());
        assert_eq!(decode_i64("-1").unwrap(), -1);
    }

    proptest! {
        #[test]
        fn u64_codec_is_lossless(value in any::<u64>()) {
            prop_assert_eq!(decode_u64(&encode_u64(value)).unwrap(), value);
        }

        #[test]
        fn estimate_never_undercounts_values(
            entries in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,16}", 0..16)
        ) {
            let total_values: usize = entries.values().map(String::len).sum();
            let props = Properties::from(entries);
            prop_assert!(props.estimate_size() >= total_values);
        }
    }
}
