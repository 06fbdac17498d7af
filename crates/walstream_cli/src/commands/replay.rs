//! Replay command implementation.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use walstream_core::{adapt_backend_to_wal, ReadOptions, Wal, WalConfig};
use walstream_message::{
    BasicMessage, ImmutableMessage, MessageId, MessageType, MutableMessage, TIME_TICK_KEY,
};
use walstream_storage::{ChannelInfo, InMemoryBackend};
use walstream_sync::Context;

/// Message representation for output.
#[derive(Debug, Serialize)]
pub struct MessageInfo {
    /// Message id.
    pub id: String,
    /// Message type.
    pub message_type: String,
    /// Format version.
    pub version: i64,
    /// Virtual channel.
    pub vchannel: String,
    /// Time tick (if assigned).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_tick: Option<u64>,
    /// Last confirmed message id (if set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_confirmed: Option<String>,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Payload, decoded lossily as UTF-8.
    pub payload: String,
}

impl From<&ImmutableMessage> for MessageInfo {
    fn from(msg: &ImmutableMessage) -> Self {
        let time_tick = if msg.properties().exists(TIME_TICK_KEY) {
            Some(msg.time_tick())
        } else {
            None
        };
        Self {
            id: msg.message_id().to_string(),
            message_type: msg.message_type().to_string(),
            version: msg.version().0,
            vchannel: msg.vchannel().to_string(),
            time_tick,
            last_confirmed: msg.try_last_confirmed_message_id().map(|id| id.to_string()),
            payload_size: msg.payload().len(),
            payload: String::from_utf8_lossy(msg.payload()).into_owned(),
        }
    }
}

/// Runs the replay command.
pub fn run(
    channel: &str,
    count: usize,
    vchannels: &[String],
    only: Option<&str>,
    after: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(InMemoryBackend::new(ChannelInfo::new(channel, 1)));
    let wal = adapt_backend_to_wal(backend.clone(), Vec::new(), None, WalConfig::default())?;
    let ctx = Context::background();

    for (i, msg) in build_messages(count, vchannels).into_iter().enumerate() {
        let result = wal.append(&ctx, msg)?;
        if i == 0 {
            info!(channel, first = %result.message_id, "replay started");
        }
    }
    backend.seal();

    let mut opts = match after {
        Some(n) => ReadOptions::start_after(MessageId::from_u64(wal.wal_name(), n)),
        None => ReadOptions::earliest(),
    };
    if let Some(only) = only {
        let only = only.to_string();
        opts = opts.filter(move |m: &ImmutableMessage| m.vchannel() == only);
    }

    let scanner = wal.read(&ctx, opts)?;
    let mut messages = Vec::new();
    for msg in scanner.messages(&ctx) {
        messages.push(MessageInfo::from(&msg?));
    }
    scanner.close();
    wal.close();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        _ => {
            print_text_output(&messages);
        }
    }

    Ok(())
}

/// Builds `count` messages spread round-robin over `vchannels`.
///
/// Every fifth message is a time tick; every insert confirms itself.
fn build_messages(count: usize, vchannels: &[String]) -> Vec<MutableMessage> {
    (0..count)
        .map(|i| {
            let vchannel = &vchannels[i % vchannels.len()];
            let tick = i as u64 + 1;
            if i % 5 == 4 {
                MutableMessage::builder(MessageType::TimeTick)
                    .build()
                    .with_vchannel(vchannel.as_str())
                    .with_time_tick(tick)
            } else {
                MutableMessage::builder(MessageType::Insert)
                    .payload(format!("row-{i}").into_bytes())
                    .build()
                    .with_vchannel(vchannel.as_str())
                    .with_time_tick(tick)
                    .with_last_confirmed_use_message_id()
            }
        })
        .collect()
}

fn print_text_output(messages: &[MessageInfo]) {
    println!("{:<8} {:<10} {:<8} {:>6} {:<8} PAYLOAD", "ID", "TYPE", "VCHAN", "TICK", "CONFIRM");
    println!("{}", "-".repeat(60));
    for m in messages {
        println!(
            "{:<8} {:<10} {:<8} {:>6} {:<8} {}",
            m.id,
            m.message_type,
            m.vchannel,
            m.time_tick.map_or_else(|| "-".to_string(), |t| t.to_string()),
            m.last_confirmed.as_deref().unwrap_or("-"),
            m.payload
        );
    }
    println!();
    println!("Total: {} messages", messages.len());
}
