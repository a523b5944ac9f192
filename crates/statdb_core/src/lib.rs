//! # statdb core
//!
//! Embedded transactional key-value store for a command-line tool's local
//! identity and usage state.
//!
//! This crate provides:
//! - A byte store of named buckets with single-writer / multi-reader
//!   snapshot transactions over one append-only commit log
//! - Crash recovery, compaction and an exclusive open-time file lock
//! - Typed values (strings, integers, timestamps, blobs) in the reserved
//!   `awless` bucket
//! - First-run bootstrap of salted, anonymized identity keys
//!
//! ## Example
//!
//! ```rust
//! use statdb_core::{Config, StaticIdentity, StatsDb};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("stats.db");
//! let identity = StaticIdentity::new("user-id", "account-id");
//!
//! let db = StatsDb::open(&path, &Config::default(), &identity).unwrap();
//! db.set_string("REGION", "us-east-1").unwrap();
//! db.close().unwrap();
//!
//! let db = StatsDb::open(&path, &Config::default(), &identity).unwrap();
//! assert_eq!(db.get_string("REGION").unwrap(), "us-east-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod bucket;
mod config;
mod error;
mod lock;
pub mod log;
mod state;
mod stats;
mod store;
mod transaction;
mod types;
pub mod value;

pub use bootstrap::{
    anonymous_id, bootstrap, bootstrap_state, BootstrapReport, BootstrapState, IdentityError,
    IdentityProvider, StaticIdentity,
};
pub use bucket::{BucketMut, BucketView, Records};
pub use config::{Config, DEFAULT_SALT};
pub use error::{CoreError, CoreResult};
pub use lock::{lock_path_for, StoreLock};
pub use stats::{StatsDb, AWLESS_AID_KEY, AWLESS_BUCKET, AWLESS_ID_KEY};
pub use store::{CompactionStats, Store, StoreStats};
pub use transaction::{ReadTransaction, Transaction, WriteTransaction};
pub use types::SequenceNumber;
pub use value::{Encoding, StoredValue, ValueError};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn handles_are_send_and_sync() {
        assert_send_sync::<Store>();
        assert_send_sync::<StatsDb>();
        assert_send_sync::<ReadTransaction>();
    }
}
