//! Read and write transactions.
//!
//! - **Read transactions** pin the committed state current at their start.
//!   They never block and never see writes that commit later.
//! - **Write transactions** are exclusive. They work on a private copy of
//!   the committed state, which is published only when the commit record is
//!   durable. Dropping an uncommitted write transaction rolls it back.

use crate::bucket::{BucketMut, BucketView};
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, Op};
use crate::state::StoreState;
use crate::store::Store;
use crate::types::SequenceNumber;
use parking_lot::MutexGuard;
use std::sync::Arc;
use tracing::debug;

/// Operations available in every transaction.
///
/// [`Store::with_transaction`] hands out a `&mut dyn Transaction` so that
/// callers can be written once for both modes; mutating calls then fail
/// with [`CoreError::ReadOnlyTransaction`] in a read transaction.
pub trait Transaction {
    /// Returns true if the transaction may mutate the store.
    fn is_writable(&self) -> bool;

    /// Returns the sequence number this transaction reads from.
    fn sequence(&self) -> SequenceNumber;

    /// Returns a view of the bucket, or `None` if it does not exist.
    fn bucket(&self, name: &str) -> Option<BucketView<'_>>;

    /// Returns the names of all buckets in order.
    fn bucket_names(&self) -> Vec<String>;

    /// Returns the bucket, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails in read-only transactions and for empty names.
    fn create_bucket_if_absent(&mut self, name: &str) -> CoreResult<BucketMut<'_>>;

    /// Deletes the bucket if present, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Fails in read-only transactions.
    fn delete_bucket(&mut self, name: &str) -> CoreResult<bool>;
}

/// A read-only snapshot transaction.
#[derive(Debug, Clone)]
pub struct ReadTransaction {
    snapshot: Arc<StoreState>,
}

impl ReadTransaction {
    pub(crate) fn new(snapshot: Arc<StoreState>) -> Self {
        Self { snapshot }
    }

    /// Returns a view of the bucket, or `None` if it does not exist.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<BucketView<'_>> {
        self.snapshot
            .buckets
            .get_key_value(name)
            .map(|(name, records)| BucketView::new(name, records))
    }

    /// Returns the sequence number of the snapshot.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.snapshot.sequence()
    }
}

impl Transaction for ReadTransaction {
    fn is_writable(&self) -> bool {
        false
    }

    fn sequence(&self) -> SequenceNumber {
        ReadTransaction::sequence(self)
    }

    fn bucket(&self, name: &str) -> Option<BucketView<'_>> {
        ReadTransaction::bucket(self, name)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.snapshot.bucket_names()
    }

    fn create_bucket_if_absent(&mut self, _name: &str) -> CoreResult<BucketMut<'_>> {
        Err(CoreError::ReadOnlyTransaction)
    }

    fn delete_bucket(&mut self, _name: &str) -> CoreResult<bool> {
        Err(CoreError::ReadOnlyTransaction)
    }
}

/// An exclusive write transaction.
///
/// Holds the store's writer lock for its whole lifetime.
pub struct WriteTransaction<'a> {
    store: &'a Store,
    _guard: MutexGuard<'a, ()>,
    state: StoreState,
    ops: Vec<Op>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(store: &'a Store, guard: MutexGuard<'a, ()>, base: &StoreState) -> Self {
        Self {
            store,
            _guard: guard,
            state: base.clone(),
            ops: Vec::new(),
        }
    }

    /// Returns a view of the bucket including uncommitted changes.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<BucketView<'_>> {
        self.state
            .buckets
            .get_key_value(name)
            .map(|(name, records)| BucketView::new(name, records))
    }

    /// Returns mutable access to an existing bucket.
    pub fn bucket_mut(&mut self, name: &str) -> Option<BucketMut<'_>> {
        let records = self.state.buckets.get_mut(name)?;
        Some(BucketMut::new(
            name.to_string(),
            Arc::make_mut(records),
            &mut self.ops,
        ))
    }

    /// Returns the bucket, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `name` is empty.
    pub fn create_bucket_if_absent(&mut self, name: &str) -> CoreResult<BucketMut<'_>> {
        if name.is_empty() {
            return Err(CoreError::invalid_argument("bucket name must not be empty"));
        }

        if !self.state.buckets.contains_key(name) {
            self.ops.push(Op::CreateBucket {
                bucket: name.to_string(),
            });
        }
        let records = self.state.buckets.entry(name.to_string()).or_default();

        Ok(BucketMut::new(
            name.to_string(),
            Arc::make_mut(records),
            &mut self.ops,
        ))
    }

    /// Deletes the bucket if present, returning whether it existed.
    pub fn delete_bucket(&mut self, name: &str) -> bool {
        if self.state.buckets.remove(name).is_none() {
            return false;
        }
        self.ops.push(Op::DeleteBucket {
            bucket: name.to_string(),
        });
        true
    }

    /// Returns true if nothing has been changed yet.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.ops.is_empty()
    }

    /// Makes every change durable and visible to new transactions.
    ///
    /// A transaction without changes commits without touching the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit record cannot be written; the store is
    /// then left exactly as it was before the transaction.
    pub fn commit(self) -> CoreResult<SequenceNumber> {
        let Self {
            store,
            _guard,
            mut state,
            ops,
        } = self;

        if ops.is_empty() {
            return Ok(state.sequence);
        }

        let sequence = state.sequence.next();
        let op_count = ops.len();
        store.log().append(&LogRecord::Commit { sequence, ops })?;

        state.sequence = sequence;
        store.publish(state);
        debug!(%sequence, ops = op_count, "write transaction committed");

        Ok(sequence)
    }

    /// Discards every change.
    pub fn rollback(self) {
        debug!(ops = self.ops.len(), "write transaction rolled back");
    }
}

impl Transaction for WriteTransaction<'_> {
    fn is_writable(&self) -> bool {
        true
    }

    fn sequence(&self) -> SequenceNumber {
        self.state.sequence
    }

    fn bucket(&self, name: &str) -> Option<BucketView<'_>> {
        WriteTransaction::bucket(self, name)
    }

    fn bucket_names(&self) -> Vec<String> {
        self.state.bucket_names()
    }

    fn create_bucket_if_absent(&mut self, name: &str) -> CoreResult<BucketMut<'_>> {
        WriteTransaction::create_bucket_if_absent(self, name)
    }

    fn delete_bucket(&mut self, name: &str) -> CoreResult<bool> {
        Ok(WriteTransaction::delete_bucket(self, name))
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("sequence", &self.state.sequence)
            .field("pending_ops", &self.ops.len())
            .finish()
    }
}
