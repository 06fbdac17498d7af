//! Stress helpers for concurrent WAL access.
//!
//! These drive a WAL from many threads at once and report throughput.

use crate::fixtures::insert_message;
use crossbeam::channel;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use walstream_core::{AppendResult, Wal, WalResult};
use walstream_message::MessageId;
use walstream_sync::Context;

/// Result of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Appends per thread.
    pub operations: usize,
    /// Number of producer threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
        }
    }
}

/// Appends from `config.threads` threads at once and collects every id.
pub fn stress_concurrent_appends(
    wal: Arc<dyn Wal>,
    config: &StressConfig,
) -> (StressTestResult, Vec<MessageId>) {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let wal = Arc::clone(&wal);
            let operations = config.operations;
            thread::spawn(move || {
                let ctx = Context::background();
                (0..operations)
                    .map(|i| {
                        wal.append(&ctx, insert_message(&format!("{t}-{i}")))
                            .map(|r| r.message_id)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = Vec::new();
    let mut failed = 0usize;
    for handle in handles {
        for result in handle.join().expect("stress thread panicked") {
            match result {
                Ok(id) => ids.push(id),
                Err(_) => failed += 1,
            }
        }
    }
    (StressTestResult::new(ids.len(), failed, start.elapsed()), ids)
}

/// Submits `config.threads * config.operations` async appends and waits
/// for every callback.
pub fn stress_async_appends(wal: &dyn Wal, config: &StressConfig) -> StressTestResult {
    let total = config.threads * config.operations;
    let (tx, rx) = channel::unbounded::<bool>();
    let start = Instant::now();
    let ctx = Context::background();
    for i in 0..total {
        let tx = tx.clone();
        wal.append_async(
            &ctx,
            insert_message(&i.to_string()),
            Box::new(move |result: WalResult<AppendResult>| {
                let _ = tx.send(result.is_ok());
            }),
        );
    }
    drop(tx);

    let (mut successful, mut failed) = (0usize, 0usize);
    for ok in rx.iter().take(total) {
        if ok {
            successful += 1;
        } else {
            failed += 1;
        }
    }
    StressTestResult::new(successful, failed, start.elapsed())
}
