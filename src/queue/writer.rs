//! Appends committed writes to the sweep queue.

use crate::error::StorageError;
use crate::queue::SweepQueueTables;
use crate::registry::TableStrategyRegistry;
use crate::types::{ShardAndStrategy, WriteInfo};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct SweepQueueWriter {
    tables: SweepQueueTables,
    registry: Arc<TableStrategyRegistry>,
    num_shards: u32,
}

impl SweepQueueWriter {
    pub fn new(
        tables: &SweepQueueTables,
        registry: Arc<TableStrategyRegistry>,
        num_shards: u32,
    ) -> Self {
        Self {
            tables: tables.clone(),
            registry,
            num_shards: num_shards.max(1),
        }
    }

    /// Queues writes for sweeping and returns how many were queued.
    ///
    /// Writes to tables without a registered strategy are never swept and are
    /// dropped here. Queueing the same write twice is harmless.
    pub fn enqueue(&self, writes: &[WriteInfo]) -> Result<usize, StorageError> {
        let mut by_shard: BTreeMap<ShardAndStrategy, Vec<WriteInfo>> = BTreeMap::new();
        let mut strategies = BTreeMap::new();
        for write in writes {
            let strategy = match strategies.get(&write.table_ref) {
                Some(strategy) => *strategy,
                None => {
                    let strategy = self.registry.strategy_for(&write.table_ref)?;
                    strategies.insert(write.table_ref.clone(), strategy);
                    strategy
                }
            };
            let Some(strategy) = strategy else {
                trace!(table = %write.table_ref, "Table not registered for sweep, skipping write");
                continue;
            };
            let shard_strategy = ShardAndStrategy::new(write.shard(self.num_shards), strategy);
            by_shard.entry(shard_strategy).or_default().push(write.clone());
        }

        let partitioning = self.tables.timestamps.partitioning();
        let mut queued = 0usize;
        for (shard_strategy, shard_writes) in &by_shard {
            let partitions: BTreeSet<u64> = shard_writes
                .iter()
                .map(|w| partitioning.partition_of(w.start_timestamp))
                .collect();
            // The marker must never be visible without its cells.
            self.tables.cells.enqueue(*shard_strategy, shard_writes)?;
            self.tables.timestamps.enqueue(*shard_strategy, &partitions)?;
            queued += shard_writes.len();
        }

        debug!(
            received = writes.len(),
            queued,
            shards = by_shard.len(),
            "Enqueued writes for sweep"
        );
        Ok(queued)
    }
}
