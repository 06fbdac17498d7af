//! Bench command implementation.

use crossbeam::channel;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;
use walstream_core::{
    adapt_backend_to_wal, AppendResult, Wal, WalAdaptor, WalConfig, WalResult, WalStatsSnapshot,
};
use walstream_message::{MessageType, MutableMessage};
use walstream_storage::{ChannelInfo, InMemoryBackend};
use walstream_sync::Context;

/// Parameters for a bench run.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Messages per producer thread.
    pub messages: usize,
    /// Producer threads.
    pub threads: usize,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Append through the async pool.
    pub use_async: bool,
    /// Async pool workers.
    pub pool_size: usize,
}

/// Bench results for output.
#[derive(Debug, Serialize)]
pub struct BenchReport {
    /// Channel the WAL served.
    pub channel: String,
    /// Append mode.
    pub mode: &'static str,
    /// Appends that succeeded.
    pub succeeded: usize,
    /// Appends that failed.
    pub failed: usize,
    /// Wall time in milliseconds.
    pub elapsed_ms: u128,
    /// Appends per second.
    pub ops_per_second: f64,
    /// Counters reported by the WAL.
    pub stats: WalStatsSnapshot,
}

/// Runs the bench command.
pub fn run(
    channel: &str,
    opts: &BenchOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(InMemoryBackend::new(ChannelInfo::new(channel, 1)));
    let config = WalConfig::default().append_pool_size(opts.pool_size);
    let wal = adapt_backend_to_wal(backend, Vec::new(), None, config)?;

    info!(
        channel,
        threads = opts.threads,
        messages = opts.messages,
        "starting bench"
    );
    let payload = vec![0x5a_u8; opts.payload_size];
    let start = Instant::now();
    let (succeeded, failed) = if opts.use_async {
        append_async(&wal, opts, &payload)
    } else {
        append_blocking(&wal, opts, &payload)
    };
    let elapsed = start.elapsed();
    wal.close();

    let secs = elapsed.as_secs_f64();
    let report = BenchReport {
        channel: channel.to_string(),
        mode: if opts.use_async { "async" } else { "sync" },
        succeeded,
        failed,
        elapsed_ms: elapsed.as_millis(),
        ops_per_second: if secs > 0.0 {
            (succeeded + failed) as f64 / secs
        } else {
            0.0
        },
        stats: wal.stats(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

fn message(payload: &[u8]) -> MutableMessage {
    MutableMessage::builder(MessageType::Insert)
        .payload(payload.to_vec())
        .build()
}

fn append_blocking(wal: &Arc<WalAdaptor>, opts: &BenchOptions, payload: &[u8]) -> (usize, usize) {
    let handles: Vec<_> = (0..opts.threads)
        .map(|_| {
            let wal = Arc::clone(wal);
            let payload = payload.to_vec();
            let messages = opts.messages;
            thread::spawn(move || {
                let ctx = Context::background();
                let mut ok = 0;
                for _ in 0..messages {
                    if wal.append(&ctx, message(&payload)).is_ok() {
                        ok += 1;
                    }
                }
                (ok, messages - ok)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().unwrap_or((0, 0)))
        .fold((0, 0), |(ok, err), (o, e)| (ok + o, err + e))
}

fn append_async(wal: &Arc<WalAdaptor>, opts: &BenchOptions, payload: &[u8]) -> (usize, usize) {
    let total = opts.threads * opts.messages;
    let (tx, rx) = channel::unbounded();
    let ctx = Context::background();
    for _ in 0..total {
        let tx = tx.clone();
        wal.append_async(
            &ctx,
            message(payload),
            Box::new(move |result: WalResult<AppendResult>| {
                let _ = tx.send(result.is_ok());
            }),
        );
    }
    drop(tx);

    rx.iter()
        .take(total)
        .fold((0, 0), |(ok, err), success| {
            if success {
                (ok + 1, err)
            } else {
                (ok, err + 1)
            }
        })
}

fn print_text_output(report: &BenchReport) {
    println!("=== Bench: {} ({}) ===", report.channel, report.mode);
    println!();
    println!("Succeeded:     {}", report.succeeded);
    println!("Failed:        {}", report.failed);
    println!("Elapsed:       {} ms", report.elapsed_ms);
    println!("Throughput:    {:.2} ops/sec", report.ops_per_second);
    println!("Bytes written: {}", report.stats.bytes_appended);
    println!("Rejected:      {}", report.stats.rejected);
}
