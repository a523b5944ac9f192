//! Exclusive store locking.
//!
//! A store file `stats.db` is guarded by an advisory lock on the sibling
//! file `stats.db.lock`. The lock lives next to the data file rather than on
//! it so that compaction can rename a fresh file into place without dropping
//! the lock.
//!
//! Acquisition polls with a bounded wait: if the current holder does not
//! release within the configured timeout, opening fails with
//! [`CoreError::OpenBusy`] instead of blocking forever.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Suffix appended to the store file name to form the lock file name.
const LOCK_SUFFIX: &str = "lock";

/// An exclusive lock on a store path, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    lock_path: PathBuf,
    file: File,
}

impl StoreLock {
    /// Acquires the lock for the store at `store_path`.
    ///
    /// Retries every `retry_interval` until `timeout` has elapsed. A zero
    /// timeout makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OpenBusy`] if another holder keeps the lock for the
    ///   whole window
    /// - [`CoreError::Io`] if the lock file cannot be opened or locked
    pub fn acquire(
        store_path: &Path,
        timeout: Duration,
        retry_interval: Duration,
    ) -> CoreResult<Self> {
        let lock_path = lock_path_for(store_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %lock_path.display(), waited = ?started.elapsed(), "store lock acquired");
                    return Ok(Self { lock_path, file });
                }
                Err(err) if is_contended(&err) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(CoreError::OpenBusy {
                            path: store_path.to_path_buf(),
                            waited,
                        });
                    }
                    let pause = retry_interval
                        .min(timeout - waited)
                        .max(Duration::from_millis(1));
                    thread::sleep(pause);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well; unlock explicitly so
        // a waiter in this process sees it without relying on close order.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Returns the lock file path guarding `store_path`.
#[must_use]
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(LOCK_SUFFIX);
    store_path.with_file_name(name)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind() || err.kind() == io::ErrorKind::WouldBlock
}
