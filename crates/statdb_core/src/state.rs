//! In-memory committed state rebuilt from the commit log.

use crate::bucket::Records;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, Op};
use crate::types::SequenceNumber;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable-by-convention image of every bucket at one sequence number.
///
/// Buckets sit behind `Arc` so a write transaction can clone the state
/// cheaply and only copy the buckets it actually touches.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub(crate) buckets: BTreeMap<String, Arc<Records>>,
    pub(crate) sequence: SequenceNumber,
}

impl StoreState {
    /// Returns the sequence number of the last commit applied.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the bucket names in order.
    #[must_use]
    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.keys().cloned().collect()
    }

    /// Returns the total number of records across buckets.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    /// Applies one operation.
    pub(crate) fn apply(&mut self, op: &Op) {
        match op {
            Op::CreateBucket { bucket } => {
                self.buckets.entry(bucket.clone()).or_default();
            }
            Op::DeleteBucket { bucket } => {
                self.buckets.remove(bucket);
            }
            Op::Put { bucket, key, value } => {
                let records = self.buckets.entry(bucket.clone()).or_default();
                Arc::make_mut(records).insert(key.clone(), value.clone());
            }
            Op::Delete { bucket, key } => {
                if let Some(records) = self.buckets.get_mut(bucket) {
                    Arc::make_mut(records).remove(key);
                }
            }
        }
    }

    /// Replays one log record on top of this state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupted`] if a commit does not advance the
    /// sequence number.
    pub(crate) fn replay(&mut self, record: LogRecord) -> CoreResult<()> {
        match record {
            LogRecord::Commit { sequence, ops } => {
                if sequence <= self.sequence {
                    return Err(CoreError::corrupted(format!(
                        "commit {sequence} does not follow {}",
                        self.sequence
                    )));
                }
                for op in &ops {
                    self.apply(op);
                }
                self.sequence = sequence;
            }
            LogRecord::Snapshot { sequence, buckets } => {
                self.buckets = buckets
                    .into_iter()
                    .map(|(name, records)| (name, Arc::new(records)))
                    .collect();
                self.sequence = sequence;
            }
        }
        Ok(())
    }

    /// Builds a snapshot record of the whole state.
    #[must_use]
    pub(crate) fn to_snapshot(&self) -> LogRecord {
        LogRecord::Snapshot {
            sequence: self.sequence,
            buckets: self
                .buckets
                .iter()
                .map(|(name, records)| (name.clone(), Records::clone(records)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(bucket: &str, key: &str, value: &str) -> Op {
        Op::Put {
            bucket: bucket.into(),
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn replay_commits_in_order() {
        let mut state = StoreState::default();
        state
            .replay(LogRecord::Commit {
                sequence: SequenceNumber::new(1),
                ops: vec![put("awless", "a", "1"), put("awless", "b", "2")],
            })
            .unwrap();
        state
            .replay(LogRecord::Commit {
                sequence: SequenceNumber::new(2),
                ops: vec![Op::Delete {
                    bucket: "awless".into(),
                    key: b"a".to_vec(),
                }],
            })
            .unwrap();

        let bucket = &state.buckets["awless"];
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.get(&b"b"[..]), Some(&b"2".to_vec()));
        assert_eq!(state.sequence(), SequenceNumber::new(2));
    }

    #[test]
    fn replay_rejects_non_increasing_sequence() {
        let mut state = StoreState::default();
        let commit = LogRecord::Commit {
            sequence: SequenceNumber::new(1),
            ops: Vec::new(),
        };
        state.replay(commit.clone()).unwrap();
        assert!(matches!(
            state.replay(commit),
            Err(CoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn snapshot_replaces_everything() {
        let mut state = StoreState::default();
        state.apply(&put("old", "k", "v"));
        state.apply(&Op::CreateBucket {
            bucket: "empty".into(),
        });
        state.sequence = SequenceNumber::new(4);

        let snapshot = state.to_snapshot();

        let mut restored = StoreState::default();
        restored.apply(&put("stale", "x", "y"));
        restored.replay(snapshot).unwrap();

        assert_eq!(restored.bucket_names(), vec!["empty", "old"]);
        assert_eq!(restored.record_count(), 1);
        assert_eq!(restored.sequence(), SequenceNumber::new(4));
    }

    #[test]
    fn clone_is_copy_on_write() {
        let mut base = StoreState::default();
        base.apply(&put("awless", "counter", "5"));

        let mut fork = base.clone();
        fork.apply(&put("awless", "counter", "6"));

        assert_eq!(
            base.buckets["awless"].get(&b"counter"[..]),
            Some(&b"5".to_vec())
        );
        assert_eq!(
            fork.buckets["awless"].get(&b"counter"[..]),
            Some(&b"6".to_vec())
        );
    }
}
