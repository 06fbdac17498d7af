//! Property-based test generators using proptest.
//!
//! Provides strategies for generating messages that respect the message
//! model's invariants: user properties never collide with reserved keys and
//! single-assignment fields are set at most once.

use proptest::prelude::*;
use walstream_message::{is_reserved_key, MessageType, MutableMessage, Properties};

/// Strategy for message payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for vchannel names.
pub fn vchannel_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,23}_v[0-9]{1,2}").expect("Invalid regex")
}

/// Strategy for data-carrying message types.
pub fn data_message_type_strategy() -> impl Strategy<Value = MessageType> {
    prop_oneof![Just(MessageType::Insert), Just(MessageType::Delete)]
}

/// Strategy for user property bags that avoid reserved keys.
pub fn user_properties_strategy() -> impl Strategy<Value = Properties> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,15}", "[ -~]{0,32}", 0..6).prop_map(|map| {
        map.into_iter()
            .filter(|(k, _)| !is_reserved_key(k))
            .collect()
    })
}

/// Strategy for mutable messages, optionally stamped with a vchannel and
/// time tick.
pub fn mutable_message_strategy() -> impl Strategy<Value = MutableMessage> {
    (
        data_message_type_strategy(),
        payload_strategy(),
        user_properties_strategy(),
        prop::option::of(vchannel_strategy()),
        prop::option::of(any::<u64>()),
    )
        .prop_map(|(message_type, payload, props, vchannel, time_tick)| {
            let mut builder = MutableMessage::builder(message_type).payload(payload);
            for (key, value) in props {
                builder = builder.property(key, value);
            }
            let mut msg = builder.build();
            if let Some(vchannel) = vchannel {
                msg = msg.with_vchannel(vchannel);
            }
            if let Some(time_tick) = time_tick {
                msg = msg.with_time_tick(time_tick);
            }
            msg
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use walstream_message::{BasicMessage, MessageId};

    proptest! {
        #[test]
        fn user_properties_never_reserved(props in user_properties_strategy()) {
            for (key, _) in props.iter() {
                prop_assert!(!is_reserved_key(key));
            }
        }

        #[test]
        fn generated_messages_survive_freezing(msg in mutable_message_strategy(), seq in 1u64..) {
            let size = msg.estimate_size();
            let vchannel = msg.vchannel().to_string();
            let frozen = msg.into_immutable(MessageId::from_u64("memory", seq));
            prop_assert_eq!(frozen.estimate_size(), size);
            prop_assert_eq!(frozen.vchannel(), vchannel.as_str());
            prop_assert_eq!(frozen.message_id().as_u64(), Some(seq));
        }
    }
}
