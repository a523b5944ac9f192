//! # statdb storage
//!
//! Byte-store backends underneath the statdb key-value store.
//!
//! Backends are **opaque byte stores**: they append, read back, flush and
//! atomically replace bytes, and know nothing about the commit log framing
//! or buckets that `statdb_core` builds on top of them.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway stores
//! - [`FileBackend`] - A single file on durable storage
//!
//! ## Example
//!
//! ```rust
//! use statdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileBackendOptions};
pub use memory::InMemoryBackend;
