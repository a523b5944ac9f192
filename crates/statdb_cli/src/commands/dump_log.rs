//! Dump-log command implementation.

use super::display_value;
use serde::Serialize;
use statdb_core::log::{scan, LogRecord, Op};
use statdb_core::{Config, StoreLock};
use statdb_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Commit log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Position of the record in the log.
    pub index: usize,
    /// Record type.
    pub record_type: String,
    /// Sequence number.
    pub sequence: u64,
    /// Operations of a commit record, one line each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<String>,
    /// Bucket count of a snapshot record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<usize>,
    /// Record count of a snapshot record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }

    let config = Config::default();
    let _lock = StoreLock::acquire(path, config.acquire_timeout, config.lock_retry_interval)?;
    let backend = FileBackend::open(path)?;
    let data = backend.read_all()?;

    let log = scan(&data)?;
    let records = describe(&log.records, limit);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
            if log.is_torn() {
                println!();
                println!("Unfinished record: {} trailing bytes", log.torn_bytes);
            }
        }
    }

    Ok(())
}

/// Converts log records into their printable form.
pub fn describe(records: &[LogRecord], limit: Option<usize>) -> Vec<LogRecordInfo> {
    records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, record)| match record {
            LogRecord::Commit { sequence, ops } => LogRecordInfo {
                index,
                record_type: "COMMIT".to_string(),
                sequence: sequence.as_u64(),
                ops: ops.iter().map(describe_op).collect(),
                buckets: None,
                records: None,
            },
            LogRecord::Snapshot { sequence, buckets } => LogRecordInfo {
                index,
                record_type: "SNAPSHOT".to_string(),
                sequence: sequence.as_u64(),
                ops: Vec::new(),
                buckets: Some(buckets.len()),
                records: Some(buckets.values().map(|b| b.len()).sum()),
            },
        })
        .collect()
}

fn describe_op(op: &Op) -> String {
    match op {
        Op::CreateBucket { bucket } => format!("create-bucket {bucket}"),
        Op::DeleteBucket { bucket } => format!("delete-bucket {bucket}"),
        Op::Put { bucket, key, value } => format!(
            "put {bucket}/{} = {}",
            String::from_utf8_lossy(key),
            display_value(value)
        ),
        Op::Delete { bucket, key } => {
            format!("delete {bucket}/{}", String::from_utf8_lossy(key))
        }
    }
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("Commit Log Records");
    println!("==================");
    println!();

    for record in records {
        match record.record_type.as_str() {
            "SNAPSHOT" => println!(
                "[{}] SNAPSHOT seq={} buckets={} records={}",
                record.index,
                record.sequence,
                record.buckets.unwrap_or(0),
                record.records.unwrap_or(0)
            ),
            _ => {
                println!("[{}] COMMIT seq={}", record.index, record.sequence);
                for op in &record.ops {
                    println!("      {op}");
                }
            }
        }
    }

    println!();
    println!("Total: {} records", records.len());
}
