//! Commit log: the on-disk representation of a store.
//!
//! A store file is a sequence of framed records. Each committed write
//! transaction appends one `Commit` record holding all of its operations, so
//! a transaction is either entirely in the log or not at all. Compaction
//! replaces the file with a single `Snapshot` record.
//!
//! ## Record Format
//!
//! ```text
//! | magic "SDBL" (4) | version (2) | type (1) | length (4) | header crc32 (4) |
//! | payload (N) | crc32 (4) |
//! ```
//!
//! The header CRC covers the first 11 bytes; the trailing CRC covers the
//! header and payload. All integers are little-endian. Names, keys and values
//! inside a payload are `u32` length-prefixed byte strings.
//!
//! ## Recovery Policy
//!
//! - A truncated header that starts with the magic, or an intact header whose
//!   payload runs past the end of the file, is a crash during append. It is
//!   discarded and the file is cut back to the last complete record.
//! - Any other damage is corruption and the store refuses to open without
//!   touching the file. A length field is trusted only once the header CRC
//!   matches.

mod reader;
mod record;
mod writer;

pub use reader::{scan, LogScan};
pub use record::{compute_crc32, LogRecord, Op, RecordType, LOG_MAGIC, LOG_VERSION};
pub use writer::CommitLog;
