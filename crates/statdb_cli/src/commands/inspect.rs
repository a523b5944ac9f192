//! Inspect command implementation.

use super::{display_value, open_existing};
use serde::Serialize;
use statdb_core::{bootstrap_state, CoreResult, Store, Transaction};
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// Commit log size in bytes.
    pub log_bytes: u64,
    /// Last committed sequence number.
    pub sequence: u64,
    /// Identity bootstrap state.
    pub bootstrap: String,
    /// Total number of records.
    pub record_count: usize,
    /// Per-bucket contents.
    pub buckets: Vec<BucketInfo>,
}

/// Contents of a single bucket.
#[derive(Debug, Serialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Records in key order.
    pub records: Vec<RecordInfo>,
}

/// A single record, rendered for display.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Key.
    pub key: String,
    /// Value, as text when printable and `0x`-prefixed hex otherwise.
    pub value: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let result = collect(&store)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers everything `inspect` reports from an open store.
pub fn collect(store: &Store) -> CoreResult<InspectResult> {
    let stats = store.stats()?;
    let state = bootstrap_state(store)?;

    let buckets = store.view(|tx| {
        let buckets = tx
            .bucket_names()
            .into_iter()
            .filter_map(|name| {
                let bucket = tx.bucket(&name)?;
                let records = bucket
                    .iter()
                    .map(|(key, value)| RecordInfo {
                        key: String::from_utf8_lossy(key).into_owned(),
                        value: display_value(value),
                    })
                    .collect();
                Some(BucketInfo { name, records })
            })
            .collect();
        Ok(buckets)
    })?;

    Ok(InspectResult {
        path: store
            .path()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
        log_bytes: stats.log_bytes,
        sequence: stats.sequence.as_u64(),
        bootstrap: state.to_string(),
        record_count: stats.records,
        buckets,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("statdb Store Inspection");
    println!("=======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:  {}", format_size(result.log_bytes));
    println!("  Sequence:  {}", result.sequence);
    println!("  Records:   {}", result.record_count);
    println!("  Identity:  {}", result.bootstrap);

    for bucket in &result.buckets {
        println!();
        println!("Bucket {} ({} records):", bucket.name, bucket.records.len());
        for record in &bucket.records {
            println!("  {} = {}", record.key, record.value);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statdb_core::{StaticIdentity, StatsDb, AWLESS_BUCKET, AWLESS_ID_KEY};

    #[test]
    fn collects_buckets_and_identity_state() {
        let db = StatsDb::open_in_memory(
            &statdb_core::Config::default(),
            &StaticIdentity::new("u-1", "a-1"),
        )
        .unwrap();
        db.set_int("RUNS", 3).unwrap();
        db.store()
            .update(|tx| tx.create_bucket_if_absent("other")?.put(b"blob", &[0, 1]))
            .unwrap();

        let result = collect(db.store()).unwrap();

        assert_eq!(result.path, ":memory:");
        assert_eq!(result.bootstrap, "initialized");
        assert_eq!(result.record_count, 4);
        assert_eq!(result.sequence, 3);

        let names: Vec<_> = result.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec![AWLESS_BUCKET, "other"]);

        let awless = &result.buckets[0];
        assert!(awless.records.iter().any(|r| r.key == AWLESS_ID_KEY && r.value.len() == 64));
        assert!(awless.records.iter().any(|r| r.key == "RUNS" && r.value == "3"));
        assert_eq!(result.buckets[1].records[0].value, "0x0001");
    }

    #[test]
    fn json_output_is_serializable() {
        let store = Store::open_in_memory().unwrap();
        let result = collect(&store).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bootstrap"], "uninitialized");
        assert_eq!(json["buckets"].as_array().unwrap().len(), 0);
    }
}
