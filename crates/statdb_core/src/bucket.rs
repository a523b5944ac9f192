//! Buckets: named, key-ordered partitions of the store.

use crate::error::{CoreError, CoreResult};
use crate::log::Op;
use std::collections::BTreeMap;

/// Records of one bucket, ordered by key.
pub type Records = BTreeMap<Vec<u8>, Vec<u8>>;

/// Read access to a bucket inside a transaction.
#[derive(Debug, Clone, Copy)]
pub struct BucketView<'a> {
    name: &'a str,
    records: &'a Records,
}

impl<'a> BucketView<'a> {
    pub(crate) fn new(name: &'a str, records: &'a Records) -> Self {
        Self { name, records }
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&'a [u8]> {
        self.records.get(key).map(Vec::as_slice)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the bucket holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.records
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.records.keys().map(Vec::as_slice)
    }
}

/// Write access to a bucket inside a write transaction.
///
/// Every mutation is applied to the transaction's private copy and recorded
/// as an operation for the commit log.
#[derive(Debug)]
pub struct BucketMut<'a> {
    name: String,
    records: &'a mut Records,
    ops: &'a mut Vec<Op>,
}

impl<'a> BucketMut<'a> {
    pub(crate) fn new(name: String, records: &'a mut Records, ops: &'a mut Vec<Op>) -> Self {
        Self { name, records, ops }
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value stored under `key`, including uncommitted writes.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.records.get(key).map(Vec::as_slice)
    }

    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `key` is empty.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::invalid_argument("key must not be empty"));
        }
        self.records.insert(key.to_vec(), value.to_vec());
        self.ops.push(Op::Put {
            bucket: self.name.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        if self.records.remove(key).is_none() {
            return false;
        }
        self.ops.push(Op::Delete {
            bucket: self.name.clone(),
            key: key.to_vec(),
        });
        true
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the bucket holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
