//! Compact command implementation.

use super::open_existing;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;

    println!("Compacting store at {}", path.display());
    let stats = store.compact()?;
    store.close()?;

    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        saved,
        if stats.bytes_before > 0 {
            (saved as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
    println!("✓ Compaction complete");

    Ok(())
}
