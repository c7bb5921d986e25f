//! Sweep Deleter
//!
//! Turns a batch of queued writes into store deletions: one sentinel call
//! (conservative only) and one bulk delete per table.

use crate::error::StorageError;
use crate::kvs::KeyValueService;
use crate::strategy::SweepStrategy;
use crate::types::{Cell, TableRef, Timestamp, WriteInfo};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SweepDeleter {
    kvs: Arc<dyn KeyValueService>,
    strategy: SweepStrategy,
}

impl SweepDeleter {
    pub fn new(kvs: Arc<dyn KeyValueService>, strategy: SweepStrategy) -> Self {
        Self { kvs, strategy }
    }

    /// Deletes the versions made stale by `writes`.
    ///
    /// Stops at the first failing table. Tables handled before the failure
    /// stay swept; running the same batch again is harmless.
    pub fn sweep(&self, writes: &[WriteInfo]) -> Result<(), StorageError> {
        if writes.is_empty() {
            return Ok(());
        }
        let by_table = partition_writes(writes);
        for (table, latest_per_cell) in &by_table {
            if self.strategy.should_add_sentinels() {
                let cells: Vec<Cell> = latest_per_cell.keys().cloned().collect();
                self.kvs
                    .add_garbage_collection_sentinel_values(table, &cells)?;
            }
            let cutoffs: BTreeMap<Cell, Timestamp> = latest_per_cell
                .iter()
                .map(|(cell, ts)| (cell.clone(), self.strategy.deletion_cutoff(*ts)))
                .collect();
            self.kvs.delete_all_timestamps(table, &cutoffs)?;
            debug!(%table, strategy = %self.strategy, cells = cutoffs.len(), "Swept table");
        }
        info!(
            strategy = %self.strategy,
            writes = writes.len(),
            tables = by_table.len(),
            "Swept batch"
        );
        Ok(())
    }
}

/// Groups writes by table, then cell, keeping each cell's newest start
/// timestamp. Older writes to the same cell are covered by the newest one.
pub fn partition_writes(writes: &[WriteInfo]) -> BTreeMap<TableRef, BTreeMap<Cell, Timestamp>> {
    let mut result: BTreeMap<TableRef, BTreeMap<Cell, Timestamp>> = BTreeMap::new();
    for write in writes {
        let latest = result
            .entry(write.table_ref.clone())
            .or_default()
            .entry(write.cell.clone())
            .or_insert(write.start_timestamp);
        *latest = (*latest).max(write.start_timestamp);
    }
    result
}
