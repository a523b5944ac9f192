//! Get command implementation.

use super::{open_existing, ValueKind};
use statdb_core::{CoreError, Encoding, Store};
use std::path::Path;

/// Runs the get command.
pub fn run(
    path: &Path,
    bucket: &str,
    key: &str,
    kind: ValueKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    println!("{}", read(&store, bucket, key, kind.into())?);
    Ok(())
}

/// Reads `key` from `bucket` and renders it in `encoding`.
///
/// A missing key renders as the encoding's zero value.
pub fn read(store: &Store, bucket: &str, key: &str, encoding: Encoding) -> Result<String, CoreError> {
    let bytes = store.view(|tx| {
        Ok(tx
            .bucket(bucket)
            .and_then(|b| b.get(key.as_bytes()))
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    })?;
    encoding
        .render(&bytes)
        .map_err(|e| CoreError::from_value(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_by_encoding() {
        let store = Store::open_in_memory().unwrap();
        store
            .update(|tx| {
                let mut bucket = tx.create_bucket_if_absent("awless")?;
                bucket.put(b"RUNS", b"12")?;
                bucket.put(b"NAME", b"dev")
            })
            .unwrap();

        assert_eq!(read(&store, "awless", "RUNS", Encoding::Int).unwrap(), "12");
        assert_eq!(read(&store, "awless", "NAME", Encoding::Str).unwrap(), "dev");
        assert_eq!(read(&store, "awless", "NAME", Encoding::Bytes).unwrap(), "646576");
        assert_eq!(read(&store, "awless", "MISSING", Encoding::Int).unwrap(), "0");
        assert!(matches!(
            read(&store, "awless", "NAME", Encoding::Int),
            Err(CoreError::Parse { .. })
        ));
    }
}
