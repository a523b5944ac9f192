//! CLI command implementations.

pub mod compact;
pub mod dump_log;
pub mod get;
pub mod inspect;
pub mod reset;
pub mod set;

use clap::ValueEnum;
use statdb_core::{Config, Encoding, Store};
use std::path::Path;

/// Value encodings selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    /// UTF-8 text
    String,
    /// Decimal integer
    Int,
    /// Timestamp, RFC 3339 on the command line
    Time,
    /// Raw bytes, hex on the command line
    Bytes,
}

impl From<ValueKind> for Encoding {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => Encoding::Str,
            ValueKind::Int => Encoding::Int,
            ValueKind::Time => Encoding::Time,
            ValueKind::Bytes => Encoding::Bytes,
        }
    }
}

/// Opens an existing store file without bootstrapping it.
pub fn open_existing(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    Ok(Store::open(path, &Config::default().create_dirs(false))?)
}

/// Renders stored bytes for display: text when printable UTF-8, hex otherwise.
pub fn display_value(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", hex::encode(bytes)),
    }
}
