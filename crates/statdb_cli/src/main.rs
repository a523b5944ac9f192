//! statdb CLI
//!
//! Command-line tools for statdb store files.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics, buckets and values
//! - `get` / `set` - Read or write one typed value
//! - `reset` - Delete a bucket
//! - `compact` - Rewrite the commit log as a single snapshot
//! - `dump-log` - Dump commit log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::ValueKind;
use statdb_core::AWLESS_BUCKET;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// statdb command-line store tools.
#[derive(Parser)]
#[command(name = "statdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics, buckets and values
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one value
    Get {
        /// Key to read
        key: String,

        /// Encoding of the stored value
        #[arg(short = 'a', long = "as", value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,

        /// Bucket to read from
        #[arg(short, long, default_value = AWLESS_BUCKET)]
        bucket: String,
    },

    /// Store one value
    Set {
        /// Key to write
        key: String,

        /// Value text (hex for bytes, RFC 3339 for time)
        value: String,

        /// Encoding to store the value with
        #[arg(short = 'a', long = "as", value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,

        /// Bucket to write to
        #[arg(short, long, default_value = AWLESS_BUCKET)]
        bucket: String,
    },

    /// Delete a bucket and everything in it
    Reset {
        /// Bucket to delete
        #[arg(short, long, default_value = AWLESS_BUCKET)]
        bucket: String,
    },

    /// Rewrite the commit log as a single snapshot
    Compact,

    /// Dump commit log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Get { key, kind, bucket } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::get::run(&path, &bucket, &key, kind)?;
        }
        Commands::Set {
            key,
            value,
            kind,
            bucket,
        } => {
            let path = cli.path.ok_or("Store path required for set")?;
            commands::set::run(&path, &bucket, &key, &value, kind)?;
        }
        Commands::Reset { bucket } => {
            let path = cli.path.ok_or("Store path required for reset")?;
            commands::reset::run(&path, &bucket)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("Store path required for dump-log")?;
            commands::dump_log::run(&path, limit, &format)?;
        }
        Commands::Version => {
            println!("statdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("statdb core v{}", statdb_core::VERSION);
        }
    }

    Ok(())
}
