//! The byte store: buckets of byte-string records over one file.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lock::StoreLock;
use crate::log::CommitLog;
use crate::state::StoreState;
use crate::transaction::{ReadTransaction, Transaction, WriteTransaction};
use crate::types::SequenceNumber;
use parking_lot::{Mutex, RwLock};
use statdb_storage::{FileBackend, FileBackendOptions, InMemoryBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Point-in-time statistics about a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of buckets.
    pub buckets: usize,
    /// Number of records across all buckets.
    pub records: usize,
    /// Size of the commit log in bytes.
    pub log_bytes: u64,
    /// Sequence number of the last commit.
    pub sequence: SequenceNumber,
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
}

/// An open store.
///
/// `Store` owns its file and the exclusive lock guarding it. Reads run on
/// consistent snapshots and never block; writes are serialized.
///
/// # Example
///
/// ```rust
/// use statdb_core::Store;
///
/// let store = Store::open_in_memory().unwrap();
///
/// store
///     .update(|tx| {
///         tx.create_bucket_if_absent("awless")?.put(b"counter", b"5")?;
///         Ok(())
///     })
///     .unwrap();
///
/// let value = store
///     .view(|tx| Ok(tx.bucket("awless").and_then(|b| b.get(b"counter")).map(<[u8]>::to_vec)))
///     .unwrap();
/// assert_eq!(value.as_deref(), Some(&b"5"[..]));
/// ```
pub struct Store {
    path: Option<PathBuf>,
    config: Config,
    log: CommitLog,
    committed: RwLock<Arc<StoreState>>,
    write_lock: Mutex<()>,
    file_lock: Mutex<Option<StoreLock>>,
    is_open: AtomicBool,
}

impl Store {
    /// Opens or creates the store file at `path`.
    ///
    /// Waits up to `config.acquire_timeout` for another holder of the same
    /// path to close it, then replays the commit log.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OpenBusy`] if the lock is not released in time
    /// - [`CoreError::Io`] / [`CoreError::Storage`] on permission or I/O errors
    /// - [`CoreError::Corrupted`] / [`CoreError::ChecksumMismatch`] if the
    ///   log is damaged
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        if config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let file_lock = StoreLock::acquire(
            path,
            config.acquire_timeout,
            config.lock_retry_interval,
        )?;

        let backend = FileBackend::open_with(
            path,
            FileBackendOptions {
                create_dirs: false,
                mode: Some(config.file_mode),
            },
        )?;

        let store = Self::from_backend(
            Some(path.to_path_buf()),
            config.clone(),
            Box::new(backend),
            Some(file_lock),
        )?;

        if let Some(threshold) = config.auto_compact_bytes {
            if store.log.size()? > threshold {
                store.compact()?;
            }
        }

        Ok(store)
    }

    /// Opens a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`Store::open`].
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a store over an arbitrary backend, without file locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend's log cannot be recovered.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        Self::from_backend(None, config, backend, None)
    }

    fn from_backend(
        path: Option<PathBuf>,
        config: Config,
        backend: Box<dyn StorageBackend>,
        file_lock: Option<StoreLock>,
    ) -> CoreResult<Self> {
        let log = CommitLog::new(backend, config.sync_on_commit);
        let scan = log.recover()?;

        let mut state = StoreState::default();
        for record in scan.records {
            state.replay(record)?;
        }

        debug!(
            path = ?path,
            buckets = state.buckets.len(),
            sequence = %state.sequence(),
            "store opened"
        );

        Ok(Self {
            path,
            config,
            log,
            committed: RwLock::new(Arc::new(state)),
            write_lock: Mutex::new(()),
            file_lock: Mutex::new(file_lock),
            is_open: AtomicBool::new(true),
        })
    }

    /// Begins a read-only transaction on the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] after [`Store::close`].
    pub fn begin_read(&self) -> CoreResult<ReadTransaction> {
        self.ensure_open()?;
        Ok(ReadTransaction::new(Arc::clone(&self.committed.read())))
    }

    /// Begins a write transaction, waiting for any other writer to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] after [`Store::close`].
    pub fn begin_write(&self) -> CoreResult<WriteTransaction<'_>> {
        self.ensure_open()?;
        let guard = self.write_lock.lock();
        // close() may have run while we waited for the writer lock
        self.ensure_open()?;
        let base = Arc::clone(&self.committed.read());
        Ok(WriteTransaction::new(self, guard, &base))
    }

    /// Runs `f` in a read transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`CoreError::StoreClosed`].
    pub fn view<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&ReadTransaction) -> CoreResult<T>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Runs `f` in a write transaction, committing if it returns `Ok`.
    ///
    /// Any error from `f` rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` or from the commit.
    pub fn update<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin_write()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    /// Runs `f` in a transaction of the requested mode.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` or from the commit.
    pub fn with_transaction<F, T>(&self, read_only: bool, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut dyn Transaction) -> CoreResult<T>,
    {
        if read_only {
            let mut tx = self.begin_read()?;
            f(&mut tx)
        } else {
            self.update(|tx| f(tx))
        }
    }

    /// Rewrites the log as one snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written; the old log is
    /// left in place.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        self.ensure_open()?;
        let _writer = self.write_lock.lock();

        let bytes_before = self.log.size()?;
        let snapshot = self.committed.read().to_snapshot();
        self.log.replace(&snapshot)?;
        let bytes_after = self.log.size()?;

        info!(bytes_before, bytes_after, "commit log compacted");
        Ok(CompactionStats {
            bytes_before,
            bytes_after,
        })
    }

    /// Returns statistics about the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        self.ensure_open()?;
        let state = Arc::clone(&self.committed.read());
        Ok(StoreStats {
            buckets: state.buckets.len(),
            records: state.record_count(),
            log_bytes: self.log.size()?,
            sequence: state.sequence(),
        })
    }

    /// Returns the sequence number of the last commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.committed.read().sequence()
    }

    /// Flushes the log and releases the file lock.
    ///
    /// Waits for an in-flight write transaction. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails; the lock is released anyway.
    pub fn close(&self) -> CoreResult<()> {
        let _writer = self.write_lock.lock();
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let synced = self.log.sync();
        self.file_lock.lock().take();
        debug!(path = ?self.path, "store closed");
        synced
    }

    /// Returns true until [`Store::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Returns the store file path, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn log(&self) -> &CommitLog {
        &self.log
    }

    pub(crate) fn publish(&self, state: StoreState) {
        *self.committed.write() = Arc::new(state);
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::StoreClosed)
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("sequence", &self.sequence())
            .field("is_open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn read(store: &Store, bucket: &str, key: &[u8]) -> Option<Vec<u8>> {
        store
            .view(|tx| Ok(tx.bucket(bucket).and_then(|b| b.get(key)).map(<[u8]>::to_vec)))
            .unwrap()
    }

    fn put(store: &Store, bucket: &str, key: &[u8], value: &[u8]) {
        store
            .update(|tx| tx.create_bucket_if_absent(bucket)?.put(key, value))
            .unwrap();
    }

    #[test]
    fn update_then_view() {
        let store = Store::open_in_memory().unwrap();
        put(&store, "awless", b"k", b"v");
        assert_eq!(read(&store, "awless", b"k"), Some(b"v".to_vec()));
        assert_eq!(store.sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn read_never_creates_bucket() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(read(&store, "awless", b"k"), None);
        assert_eq!(store.stats().unwrap().buckets, 0);
    }

    #[test]
    fn failing_update_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        put(&store, "awless", b"k", b"before");

        let result: CoreResult<()> = store.update(|tx| {
            tx.create_bucket_if_absent("awless")?.put(b"k", b"after")?;
            tx.create_bucket_if_absent("other")?.put(b"x", b"y")?;
            Err(CoreError::invalid_argument("abort"))
        });

        assert!(result.is_err());
        assert_eq!(read(&store, "awless", b"k"), Some(b"before".to_vec()));
        assert_eq!(read(&store, "other", b"x"), None);
        assert_eq!(store.sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn dropped_write_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        {
            let mut tx = store.begin_write().unwrap();
            tx.create_bucket_if_absent("awless")
                .unwrap()
                .put(b"k", b"v")
                .unwrap();
        }
        assert_eq!(read(&store, "awless", b"k"), None);
    }

    #[test]
    fn write_transaction_sees_own_changes() {
        let store = Store::open_in_memory().unwrap();
        let mut tx = store.begin_write().unwrap();
        tx.create_bucket_if_absent("awless")
            .unwrap()
            .put(b"k", b"v")
            .unwrap();
        assert_eq!(
            tx.bucket("awless").and_then(|b| b.get(b"k")),
            Some(&b"v"[..])
        );
        tx.commit().unwrap();
    }

    #[test]
    fn snapshot_isolation() {
        let store = Store::open_in_memory().unwrap();
        put(&store, "awless", b"counter", b"5");

        let reader = store.begin_read().unwrap();

        let mut writer = store.begin_write().unwrap();
        writer
            .create_bucket_if_absent("awless")
            .unwrap()
            .put(b"counter", b"6")
            .unwrap();

        // Uncommitted write is invisible to readers old and new
        assert_eq!(
            reader.bucket("awless").and_then(|b| b.get(b"counter")),
            Some(&b"5"[..])
        );
        assert_eq!(read(&store, "awless", b"counter"), Some(b"5".to_vec()));

        writer.commit().unwrap();

        // The pinned snapshot stays put; a fresh reader sees the commit
        assert_eq!(
            reader.bucket("awless").and_then(|b| b.get(b"counter")),
            Some(&b"5"[..])
        );
        assert_eq!(read(&store, "awless", b"counter"), Some(b"6".to_vec()));
    }

    #[test]
    fn delete_bucket_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        put(&store, "awless", b"k", b"v");

        assert!(store.update(|tx| Ok(tx.delete_bucket("awless"))).unwrap());
        assert!(!store.update(|tx| Ok(tx.delete_bucket("awless"))).unwrap());
        assert_eq!(read(&store, "awless", b"k"), None);
    }

    #[test]
    fn with_transaction_read_only_rejects_writes() {
        let store = Store::open_in_memory().unwrap();

        let result = store.with_transaction(true, |tx| {
            tx.create_bucket_if_absent("awless")?;
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::ReadOnlyTransaction)));

        store
            .with_transaction(false, |tx| {
                assert!(tx.is_writable());
                tx.create_bucket_if_absent("awless")?.put(b"k", b"v")
            })
            .unwrap();

        let names = store.with_transaction(true, |tx| Ok(tx.bucket_names())).unwrap();
        assert_eq!(names, vec!["awless"]);
    }

    #[test]
    fn empty_bucket_name_rejected() {
        let store = Store::open_in_memory().unwrap();
        let result = store.update(|tx| tx.create_bucket_if_absent("").map(|_| ()));
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn clean_commit_does_not_touch_log() {
        let store = Store::open_in_memory().unwrap();
        let tx = store.begin_write().unwrap();
        assert!(tx.is_clean());
        assert_eq!(tx.commit().unwrap(), SequenceNumber::new(0));
        assert_eq!(store.stats().unwrap().log_bytes, 0);
    }

    #[test]
    fn reopen_restores_state() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");
        let config = Config::default();

        {
            let store = Store::open(&path, &config).unwrap();
            put(&store, "awless", b"a", b"1");
            put(&store, "awless", b"b", b"2");
            store
                .update(|tx| {
                    tx.bucket_mut("awless").unwrap().delete(b"a");
                    Ok(())
                })
                .unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path, &config).unwrap();
        assert_eq!(read(&store, "awless", b"a"), None);
        assert_eq!(read(&store, "awless", b"b"), Some(b"2".to_vec()));
        assert_eq!(store.sequence(), SequenceNumber::new(3));
    }

    #[test]
    fn torn_commit_is_discarded_on_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");

        {
            let store = Store::open(&path, &Config::default()).unwrap();
            put(&store, "awless", b"a", b"1");
        }

        let good_len = fs::metadata(&path).unwrap().len();
        {
            use std::io::Write;
            let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"SDBL\x01\x00\x01\xff").unwrap();
        }

        let store = Store::open(&path, &Config::default()).unwrap();
        assert_eq!(read(&store, "awless", b"a"), Some(b"1".to_vec()));
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        put(&store, "awless", b"b", b"2");
        drop(store);

        let store = Store::open(&path, &Config::default()).unwrap();
        assert_eq!(read(&store, "awless", b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn corrupted_log_refuses_to_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");

        {
            let store = Store::open(&path, &Config::default()).unwrap();
            put(&store, "awless", b"key", b"value");
        }

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 6;
        data[last] ^= 0xFF;
        fs::write(&path, data).unwrap();

        let result = Store::open(&path, &Config::default());
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn second_open_is_busy() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");
        let config = Config::default().acquire_timeout(Duration::from_millis(100));

        let _first = Store::open(&path, &config).unwrap();
        let second = Store::open(&path, &config);
        assert!(second.unwrap_err().is_busy());
    }

    #[test]
    fn close_releases_lock_and_rejects_use() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");
        let config = Config::default().acquire_timeout(Duration::ZERO);

        let first = Store::open(&path, &config).unwrap();
        first.close().unwrap();
        first.close().unwrap();
        assert!(!first.is_open());
        assert!(matches!(first.begin_read(), Err(CoreError::StoreClosed)));
        assert!(matches!(first.begin_write(), Err(CoreError::StoreClosed)));

        let _second = Store::open(&path, &config).unwrap();
    }

    #[test]
    fn compact_shrinks_log_and_keeps_data() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");

        let store = Store::open(&path, &Config::default()).unwrap();
        for i in 0..50 {
            put(&store, "awless", b"counter", i.to_string().as_bytes());
        }
        store.update(|tx| tx.create_bucket_if_absent("empty").map(|_| ())).unwrap();

        let stats = store.compact().unwrap();
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(store.stats().unwrap().log_bytes, stats.bytes_after);

        // Commits continue on top of the snapshot
        put(&store, "awless", b"after", b"compaction");
        drop(store);

        let store = Store::open(&path, &Config::default()).unwrap();
        assert_eq!(read(&store, "awless", b"counter"), Some(b"49".to_vec()));
        assert_eq!(read(&store, "awless", b"after"), Some(b"compaction".to_vec()));
        assert_eq!(store.stats().unwrap().buckets, 2);
        assert_eq!(store.sequence(), SequenceNumber::new(52));
    }

    #[test]
    fn auto_compaction_on_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stats.db");

        {
            let store = Store::open(&path, &Config::default()).unwrap();
            for i in 0..20 {
                put(&store, "awless", b"counter", i.to_string().as_bytes());
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let config = Config::default().auto_compact_bytes(Some(64));
        let store = Store::open(&path, &config).unwrap();
        assert!(store.stats().unwrap().log_bytes < before);
        assert_eq!(read(&store, "awless", b"counter"), Some(b"19".to_vec()));
    }

    #[test]
    fn open_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("dir").join("stats.db");

        let store = Store::open(&path, &Config::default()).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
