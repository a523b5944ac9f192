//! Commit log writer.

use crate::error::CoreResult;
use crate::log::reader::{scan, LogScan};
use crate::log::record::LogRecord;
use parking_lot::Mutex;
use statdb_storage::StorageBackend;
use tracing::{debug, warn};

/// Append-only commit log over a storage backend.
///
/// A record is durable once [`CommitLog::append`] returns. If an append
/// fails part way, the log is cut back to its previous length so a later
/// commit never lands behind a torn record.
pub struct CommitLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl CommitLog {
    /// Creates a commit log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Reads and validates the whole log, cutting off a torn tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted or cannot be read.
    pub fn recover(&self) -> CoreResult<LogScan> {
        let mut backend = self.backend.lock();
        let data = backend.read_all()?;
        let scan = scan(&data)?;

        if scan.is_torn() {
            warn!(
                torn_bytes = scan.torn_bytes,
                valid_len = scan.valid_len,
                "discarding partially written commit record"
            );
            backend.truncate(scan.valid_len)?;
        }

        debug!(records = scan.records.len(), bytes = scan.valid_len, "commit log recovered");
        Ok(scan)
    }

    /// Appends a record and makes it durable.
    ///
    /// Returns the offset where the record was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded, written or synced.
    pub fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let data = record.encode()?;

        let mut backend = self.backend.lock();
        let start = backend.size()?;

        let written = backend.append(&data).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(cut) = backend.truncate(start) {
                    warn!(error = %cut, "could not roll back failed commit append");
                }
                Err(err.into())
            }
        }
    }

    /// Atomically replaces the log contents with a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be written durably.
    pub fn replace(&self, record: &LogRecord) -> CoreResult<()> {
        let data = record.encode()?;
        self.backend.lock().replace_all(&data)?;
        Ok(())
    }

    /// Flushes the log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::Op;
    use crate::types::SequenceNumber;
    use statdb_storage::InMemoryBackend;

    fn commit(seq: u64) -> LogRecord {
        LogRecord::Commit {
            sequence: SequenceNumber::new(seq),
            ops: vec![Op::CreateBucket {
                bucket: format!("b{seq}"),
            }],
        }
    }

    #[test]
    fn append_then_recover() {
        let log = CommitLog::new(Box::new(InMemoryBackend::new()), true);
        assert_eq!(log.append(&commit(1)).unwrap(), 0);
        log.append(&commit(2)).unwrap();

        let scan = log.recover().unwrap();
        assert_eq!(scan.records, vec![commit(1), commit(2)]);
    }

    #[test]
    fn recover_truncates_torn_tail() {
        let mut data = commit(1).encode().unwrap();
        let complete = data.len() as u64;
        data.extend_from_slice(&commit(2).encode().unwrap()[..5]);

        let log = CommitLog::new(Box::new(InMemoryBackend::with_data(data)), true);
        let scan = log.recover().unwrap();

        assert_eq!(scan.records.len(), 1);
        assert_eq!(log.size().unwrap(), complete);

        // The next append starts right after the last good record
        assert_eq!(log.append(&commit(2)).unwrap(), complete);
        assert_eq!(log.recover().unwrap().records.len(), 2);
    }

    #[test]
    fn replace_leaves_single_record() {
        let log = CommitLog::new(Box::new(InMemoryBackend::new()), false);
        log.append(&commit(1)).unwrap();
        log.append(&commit(2)).unwrap();

        log.replace(&commit(3)).unwrap();
        assert_eq!(log.recover().unwrap().records, vec![commit(3)]);
    }
}
