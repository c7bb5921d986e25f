//! Sweepable timestamps: the coarse level of the queue.
//!
//! One marker per (shard, strategy, partition) that has ever received a write.
//! Lets the reader skip empty timestamp ranges without touching the cell index.

use crate::error::StorageError;
use crate::queue::keys::{self, TimestampPartitioning};
use crate::types::{ShardAndStrategy, Timestamp};
use std::collections::BTreeSet;
use tracing::trace;

pub(crate) const TREE_SWEEPABLE_TIMESTAMPS: &str = "sweepable_timestamps";

pub trait SweepableTimestamps: Send + Sync {
    /// Next partition intersecting `(last_swept_ts, max_ts_exclusive)` that has
    /// at least one marker, lowest first.
    fn next_sweepable_timestamp_partition(
        &self,
        shard_strategy: ShardAndStrategy,
        last_swept_ts: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<Option<u64>, StorageError>;

    fn enqueue(
        &self,
        shard_strategy: ShardAndStrategy,
        partitions: &BTreeSet<u64>,
    ) -> Result<(), StorageError>;

    /// Drops markers of partitions whose every timestamp is in
    /// `(previous_last_swept, new_last_swept]` or below.
    fn delete_through(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), StorageError>;

    fn partitioning(&self) -> TimestampPartitioning;
}

pub struct SledSweepableTimestamps {
    tree: sled::Tree,
    partitioning: TimestampPartitioning,
}

impl SledSweepableTimestamps {
    pub fn new(db: &sled::Db, partitioning: TimestampPartitioning) -> Result<Self, StorageError> {
        let tree = db
            .open_tree(TREE_SWEEPABLE_TIMESTAMPS)
            .map_err(|e| StorageError::from_sled("Failed to open sweepable timestamps", e))?;
        Ok(Self { tree, partitioning })
    }
}

impl SweepableTimestamps for SledSweepableTimestamps {
    fn next_sweepable_timestamp_partition(
        &self,
        shard_strategy: ShardAndStrategy,
        last_swept_ts: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<Option<u64>, StorageError> {
        let first_unswept = last_swept_ts.saturating_add(1);
        if first_unswept >= max_ts_exclusive {
            return Ok(None);
        }

        let from = keys::timestamp_key(
            shard_strategy,
            self.partitioning.partition_of(first_unswept),
        );
        let to = keys::timestamp_key(
            shard_strategy,
            self.partitioning.partition_of(max_ts_exclusive - 1),
        );

        match self.tree.range(from..=to).next() {
            Some(entry) => {
                let (key, _) = entry
                    .map_err(|e| StorageError::from_sled("Failed to scan sweepable timestamps", e))?;
                let partition = keys::decode_timestamp_key(&key)?;
                trace!(%shard_strategy, partition, "Found sweepable partition");
                Ok(Some(partition))
            }
            None => Ok(None),
        }
    }

    fn enqueue(
        &self,
        shard_strategy: ShardAndStrategy,
        partitions: &BTreeSet<u64>,
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for partition in partitions {
            batch.insert(keys::timestamp_key(shard_strategy, *partition), &[] as &[u8]);
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to record sweepable timestamps", e))
    }

    fn delete_through(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), StorageError> {
        // Only partitions swept to their last timestamp are finished; a partition
        // cut short by the ceiling keeps its marker for the next cycle.
        let partition = self.partitioning.partition_of(new_last_swept);
        let last_complete = if self.partitioning.last_timestamp(partition) == new_last_swept {
            Some(partition)
        } else {
            partition.checked_sub(1)
        };
        let Some(last_complete) = last_complete else {
            return Ok(());
        };
        let first = self
            .partitioning
            .partition_of(previous_last_swept.saturating_add(1));
        if first > last_complete {
            return Ok(());
        }

        let from = keys::timestamp_key(shard_strategy, first);
        let to = keys::timestamp_key(shard_strategy, last_complete);
        let mut batch = sled::Batch::default();
        for entry in self.tree.range(from..=to) {
            let (key, _) = entry
                .map_err(|e| StorageError::from_sled("Failed to scan sweepable timestamps", e))?;
            batch.remove(key);
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to scrub sweepable timestamps", e))
    }

    fn partitioning(&self) -> TimestampPartitioning {
        self.partitioning
    }
}
