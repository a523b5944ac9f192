//! Reset command implementation.

use super::open_existing;
use std::path::Path;

/// Runs the reset command.
pub fn run(path: &Path, bucket: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let existed = store.update(|tx| Ok(tx.delete_bucket(bucket)))?;
    store.close()?;

    if existed {
        println!("Deleted bucket {bucket}");
    } else {
        println!("Bucket {bucket} does not exist");
    }
    Ok(())
}
