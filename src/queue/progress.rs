//! Durable sled-backed sweep progress.

use crate::error::StorageError;
use crate::queue::keys;
use crate::types::{ShardAndStrategy, Timestamp, INITIAL_LAST_SWEPT_TIMESTAMP};
use tracing::warn;

pub(crate) const TREE_SWEEP_PROGRESS: &str = "sweep_progress";

pub trait SweepProgress: Send + Sync {
    /// Last timestamp (inclusive) fully processed for the shard, or the floor
    /// if the shard has never been swept.
    fn last_swept_timestamp(&self, shard_strategy: ShardAndStrategy)
        -> Result<Timestamp, StorageError>;

    /// Records a new watermark. A value below the stored one is ignored.
    fn update_last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
        timestamp: Timestamp,
    ) -> Result<(), StorageError>;

    /// Every shard with recorded progress, in key order.
    fn list(&self) -> Result<Vec<(ShardAndStrategy, Timestamp)>, StorageError>;
}

#[derive(Clone)]
pub struct SledSweepProgress {
    tree: sled::Tree,
}

impl SledSweepProgress {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        let tree = db
            .open_tree(TREE_SWEEP_PROGRESS)
            .map_err(|e| StorageError::from_sled("Failed to open sweep progress", e))?;
        Ok(Self { tree })
    }
}

fn decode_progress(raw: Option<&[u8]>) -> Option<Timestamp> {
    raw.filter(|bytes| bytes.len() == 8).map(keys::read_u64)
}

fn corrupt_progress(shard_strategy: ShardAndStrategy, len: usize) -> StorageError {
    StorageError::CorruptKey {
        tree: TREE_SWEEP_PROGRESS,
        detail: format!("progress value for {} has {} bytes", shard_strategy, len),
    }
}

impl SweepProgress for SledSweepProgress {
    fn last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
    ) -> Result<Timestamp, StorageError> {
        let raw = self
            .tree
            .get(keys::progress_key(shard_strategy))
            .map_err(|e| StorageError::from_sled("Failed to read sweep progress", e))?;
        match raw {
            None => Ok(INITIAL_LAST_SWEPT_TIMESTAMP),
            Some(bytes) => decode_progress(Some(bytes.as_ref()))
                .ok_or_else(|| corrupt_progress(shard_strategy, bytes.len())),
        }
    }

    fn update_last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
        timestamp: Timestamp,
    ) -> Result<(), StorageError> {
        let key = keys::progress_key(shard_strategy);
        loop {
            let current = self
                .tree
                .get(&key)
                .map_err(|e| StorageError::from_sled("Failed to read sweep progress", e))?;
            let stored = match current.as_deref() {
                None => INITIAL_LAST_SWEPT_TIMESTAMP,
                Some(bytes) => decode_progress(Some(bytes))
                    .ok_or_else(|| corrupt_progress(shard_strategy, bytes.len()))?,
            };
            if stored >= timestamp {
                if stored > timestamp {
                    warn!(
                        %shard_strategy,
                        previous = stored,
                        requested = timestamp,
                        "Ignoring attempt to move sweep progress backwards"
                    );
                }
                return Ok(());
            }

            let swapped = self
                .tree
                .compare_and_swap(&key, current, Some(timestamp.to_be_bytes().to_vec()))
                .map_err(|e| StorageError::from_sled("Failed to update sweep progress", e))?;
            if swapped.is_ok() {
                return Ok(());
            }
            // Lost a race with another writer; re-read and compare again.
        }
    }

    fn list(&self) -> Result<Vec<(ShardAndStrategy, Timestamp)>, StorageError> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan sweep progress", e))?;
            let shard_strategy = keys::decode_shard_prefix(TREE_SWEEP_PROGRESS, &key)?;
            let timestamp = decode_progress(Some(value.as_ref()))
                .ok_or_else(|| corrupt_progress(shard_strategy, value.len()))?;
            out.push((shard_strategy, timestamp));
        }
        Ok(out)
    }
}
