//! Error types for statdb core.

use crate::bootstrap::IdentityError;
use crate::value::ValueError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in statdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] statdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another holder kept the store locked for the whole acquisition window.
    #[error("store {} is locked by another holder (gave up after {waited:?})", path.display())]
    OpenBusy {
        /// Path of the store file.
        path: PathBuf,
        /// How long open waited for the lock.
        waited: Duration,
    },

    /// The commit log is damaged.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch in a commit log record.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the damaged record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The identity collaborator could not supply a seed.
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(#[from] IdentityError),

    /// A stored integer is not valid base-10 text.
    #[error("value of {key:?} is not an integer: {value:?}")]
    Parse {
        /// Key that was read.
        key: String,
        /// The offending stored text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// A stored value does not decode under the requested encoding.
    #[error("value of {key:?} could not be decoded: {message}")]
    Decode {
        /// Key that was read.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// Caller passed an argument the store cannot accept.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A mutation was attempted inside a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,
}

impl CoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Attaches the key being read to a value decoding failure.
    pub fn from_value(key: &str, err: ValueError) -> Self {
        match err {
            ValueError::Integer { text, source } => Self::Parse {
                key: key.to_string(),
                value: text,
                source,
            },
            other => Self::Decode {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Returns true if this is an [`CoreError::OpenBusy`] error.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::OpenBusy { .. })
    }
}
