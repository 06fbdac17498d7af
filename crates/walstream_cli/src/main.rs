//! walstream CLI
//!
//! Command-line tools for exercising a governed WAL over the in-memory
//! backend.
//!
//! # Commands
//!
//! - `bench` - Measure append throughput, sync or async
//! - `replay` - Append a batch of messages and read them back

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// walstream command-line tools.
#[derive(Parser)]
#[command(name = "walstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Channel name for the WAL
    #[arg(global = true, short, long, default_value = "cli")]
    channel: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure append throughput
    Bench {
        /// Messages to append per producer thread
        #[arg(short, long, default_value = "10000")]
        messages: usize,

        /// Producer threads
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value = "128")]
        payload_size: usize,

        /// Use the async append pool instead of blocking appends
        #[arg(short, long)]
        r#async: bool,

        /// Workers in the async append pool
        #[arg(long, default_value_t = walstream_core::DEFAULT_APPEND_POOL_SIZE)]
        pool_size: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Append messages across vchannels and read them back
    Replay {
        /// Messages to append
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Comma-separated vchannels to spread messages over
        #[arg(long, default_value = "v0,v1")]
        vchannels: String,

        /// Only print messages for this vchannel
        #[arg(long)]
        only: Option<String>,

        /// Start after this message id instead of the earliest message
        #[arg(long)]
        after: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Bench {
            messages,
            threads,
            payload_size,
            r#async,
            pool_size,
            format,
        } => {
            let opts = commands::bench::BenchOptions {
                messages,
                threads,
                payload_size,
                use_async: r#async,
                pool_size,
            };
            commands::bench::run(&cli.channel, &opts, &format)?;
        }
        Commands::Replay {
            count,
            vchannels,
            only,
            after,
            format,
        } => {
            let vchannels: Vec<String> = vchannels
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect();
            if vchannels.is_empty() {
                return Err("At least one vchannel required for replay".into());
            }
            commands::replay::run(&cli.channel, count, &vchannels, only.as_deref(), after, &format)?;
        }
        Commands::Version => {
            println!("walstream CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
