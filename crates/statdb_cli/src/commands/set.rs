//! Set command implementation.

use super::{open_existing, ValueKind};
use statdb_core::{CoreError, Encoding, SequenceNumber, Store};
use std::path::Path;
use tracing::info;

/// Runs the set command.
pub fn run(
    path: &Path,
    bucket: &str,
    key: &str,
    value: &str,
    kind: ValueKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let sequence = write(&store, bucket, key, value, kind.into())?;
    info!(bucket, key, %sequence, "value stored");
    store.close()?;
    Ok(())
}

/// Parses `value` as `encoding` and stores it under `key`.
pub fn write(
    store: &Store,
    bucket: &str,
    key: &str,
    value: &str,
    encoding: Encoding,
) -> Result<SequenceNumber, CoreError> {
    let bytes = encoding
        .parse_text(value)
        .map_err(|e| CoreError::invalid_argument(format!("{key}: {e}")))?;
    store.update(|tx| tx.create_bucket_if_absent(bucket)?.put(key.as_bytes(), &bytes))?;
    Ok(store.sequence())
}
