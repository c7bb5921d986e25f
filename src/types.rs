//! Core types shared by the queue, the deleter and the store.

use crate::strategy::SweepStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction timestamp. Larger is newer.
pub type Timestamp = u64;

/// Timestamp at which garbage-collection sentinels live. No transaction
/// writes at this timestamp.
pub const SENTINEL_TIMESTAMP: Timestamp = 0;

/// Progress floor for a shard that has never been swept.
pub const INITIAL_LAST_SWEPT_TIMESTAMP: Timestamp = 0;

/// Upper bound on the number of shards a queue may be split into.
pub const MAX_SHARDS: u32 = 256;

/// Fully qualified table name, e.g. `namespace.table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef(String);

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        TableRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::new(name)
    }
}

/// Row/column coordinate of a value inside a table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: Vec<u8>,
    pub column: Vec<u8>,
}

impl Cell {
    pub fn new(row: impl Into<Vec<u8>>, column: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", hex::encode(&self.row), hex::encode(&self.column))
    }
}

/// A committed write that may have left stale versions behind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteInfo {
    pub table_ref: TableRef,
    pub cell: Cell,
    pub start_timestamp: Timestamp,
}

impl WriteInfo {
    pub fn new(table_ref: TableRef, cell: Cell, start_timestamp: Timestamp) -> Self {
        Self {
            table_ref,
            cell,
            start_timestamp,
        }
    }

    /// Stable digest of (table, cell). Drives both shard assignment and index
    /// key layout, so it must never change for a given write.
    pub fn cell_digest(&self) -> [u8; 32] {
        cell_digest(&self.table_ref, &self.cell)
    }

    pub fn shard(&self, num_shards: u32) -> u32 {
        shard_for(&self.table_ref, &self.cell, num_shards)
    }

    /// Highest timestamp of this cell that the given strategy may delete.
    pub fn deletion_cutoff(&self, strategy: SweepStrategy) -> Timestamp {
        strategy.deletion_cutoff(self.start_timestamp)
    }
}

/// Length-prefixed blake3 digest of (table, row, column).
pub fn cell_digest(table_ref: &TableRef, cell: &Cell) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in [table_ref.as_str().as_bytes(), &cell.row, &cell.column] {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Deterministic shard of a cell in `[0, num_shards)`.
pub fn shard_for(table_ref: &TableRef, cell: &Cell, num_shards: u32) -> u32 {
    let digest = cell_digest(table_ref, cell);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(num_shards.max(1))) as u32
}

/// Partition key of the sweep queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardAndStrategy {
    pub shard: u32,
    pub strategy: SweepStrategy,
}

impl ShardAndStrategy {
    pub fn new(shard: u32, strategy: SweepStrategy) -> Self {
        Self { shard, strategy }
    }

    pub fn conservative(shard: u32) -> Self {
        Self::new(shard, SweepStrategy::Conservative)
    }

    pub fn thorough(shard: u32) -> Self {
        Self::new(shard, SweepStrategy::Thorough)
    }

    /// Every shard of both strategies for a queue of `num_shards` shards.
    pub fn all(num_shards: u32) -> Vec<Self> {
        SweepStrategy::ALL
            .iter()
            .flat_map(|strategy| (0..num_shards).map(move |shard| Self::new(shard, *strategy)))
            .collect()
    }
}

impl fmt::Display for ShardAndStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard, self.strategy)
    }
}

/// Writes handed to the consumer in one cycle, plus the watermark reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepBatch {
    pub writes: Vec<WriteInfo>,
    /// Inclusive timestamp up to which the queue has been fully examined.
    pub last_swept_timestamp: Timestamp,
}

impl SweepBatch {
    pub fn new(writes: Vec<WriteInfo>, last_swept_timestamp: Timestamp) -> Self {
        Self {
            writes,
            last_swept_timestamp,
        }
    }

    pub fn empty(last_swept_timestamp: Timestamp) -> Self {
        Self::new(Vec::new(), last_swept_timestamp)
    }
}
