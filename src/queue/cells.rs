//! Sweepable cells: the fine level of the queue.
//!
//! Holds every queued [`WriteInfo`] keyed by shard, strategy and start
//! timestamp, and turns one coarse partition into a [`SweepBatch`].

use crate::error::StorageError;
use crate::queue::keys::{self, TimestampPartitioning};
use crate::types::{ShardAndStrategy, SweepBatch, Timestamp, WriteInfo};
use std::collections::BTreeMap;
use tracing::trace;

pub(crate) const TREE_SWEEPABLE_CELLS: &str = "sweepable_cells";

pub trait SweepableCells: Send + Sync {
    /// Writes of `partition` inside `(last_swept_ts, max_ts_exclusive)`, one per
    /// cell, together with the watermark reached.
    ///
    /// The watermark is the partition's last timestamp when the whole partition
    /// lies below the ceiling, and `max_ts_exclusive - 1` otherwise.
    fn get_batch_for_partition(
        &self,
        shard_strategy: ShardAndStrategy,
        partition: u64,
        last_swept_ts: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<SweepBatch, StorageError>;

    fn enqueue(
        &self,
        shard_strategy: ShardAndStrategy,
        writes: &[WriteInfo],
    ) -> Result<(), StorageError>;

    /// Removes writes with start timestamp in `(previous_last_swept, new_last_swept]`.
    fn delete_through(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), StorageError>;

    /// Number of writes still queued for a shard.
    fn pending_writes(&self, shard_strategy: ShardAndStrategy) -> Result<usize, StorageError>;
}

pub struct SledSweepableCells {
    tree: sled::Tree,
    partitioning: TimestampPartitioning,
}

impl SledSweepableCells {
    pub fn new(db: &sled::Db, partitioning: TimestampPartitioning) -> Result<Self, StorageError> {
        let tree = db
            .open_tree(TREE_SWEEPABLE_CELLS)
            .map_err(|e| StorageError::from_sled("Failed to open sweepable cells", e))?;
        Ok(Self { tree, partitioning })
    }
}

impl SweepableCells for SledSweepableCells {
    fn get_batch_for_partition(
        &self,
        shard_strategy: ShardAndStrategy,
        partition: u64,
        last_swept_ts: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<SweepBatch, StorageError> {
        let partition_last = self.partitioning.last_timestamp(partition);
        let watermark = if partition_last < max_ts_exclusive {
            partition_last
        } else {
            max_ts_exclusive.saturating_sub(1)
        };
        let from = self
            .partitioning
            .first_timestamp(partition)
            .max(last_swept_ts.saturating_add(1));
        if from > watermark {
            return Ok(SweepBatch::empty(watermark));
        }

        // Writes above the watermark never reach the dedup map, so a cell's
        // surviving timestamp is always one the watermark covers.
        let (start, end) = keys::cell_key_range(shard_strategy, from, watermark);
        let mut latest_per_cell: BTreeMap<[u8; 32], WriteInfo> = BTreeMap::new();
        for entry in self.tree.range(start..=end) {
            let (key, value) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan sweepable cells", e))?;
            let write: WriteInfo = bincode::deserialize(&value)
                .map_err(|e| StorageError::from_codec("Failed to decode queued write", e))?;
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&key[keys::CELL_KEY_LEN - 32..]);
            match latest_per_cell.get(&digest) {
                Some(existing) if existing.start_timestamp >= write.start_timestamp => {}
                _ => {
                    latest_per_cell.insert(digest, write);
                }
            }
        }

        trace!(
            %shard_strategy,
            partition,
            watermark,
            cells = latest_per_cell.len(),
            "Loaded sweep batch"
        );
        Ok(SweepBatch::new(
            latest_per_cell.into_values().collect(),
            watermark,
        ))
    }

    fn enqueue(
        &self,
        shard_strategy: ShardAndStrategy,
        writes: &[WriteInfo],
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for write in writes {
            if write.start_timestamp == crate::types::SENTINEL_TIMESTAMP {
                return Err(StorageError::ReservedTimestamp(write.start_timestamp));
            }
            let key = keys::cell_key(shard_strategy, write.start_timestamp, &write.cell_digest());
            let value = bincode::serialize(write)
                .map_err(|e| StorageError::from_codec("Failed to encode queued write", e))?;
            batch.insert(key, value);
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to record sweepable cells", e))
    }

    fn delete_through(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), StorageError> {
        let from = previous_last_swept.saturating_add(1);
        if from > new_last_swept {
            return Ok(());
        }
        let (start, end) = keys::cell_key_range(shard_strategy, from, new_last_swept);
        let mut batch = sled::Batch::default();
        for entry in self.tree.range(start..=end) {
            let (key, _) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan sweepable cells", e))?;
            batch.remove(key);
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to scrub sweepable cells", e))
    }

    fn pending_writes(&self, shard_strategy: ShardAndStrategy) -> Result<usize, StorageError> {
        let mut count = 0usize;
        for entry in self.tree.scan_prefix(keys::shard_prefix(shard_strategy)) {
            entry.map_err(|e| StorageError::from_sled("Failed to scan sweepable cells", e))?;
            count += 1;
        }
        Ok(count)
    }
}
