//! Versioned key-value store
//!
//! The sweep engine only needs a handful of primitives from the store it
//! cleans: sentinel insertion, bulk deletion of old versions, and candidate
//! enumeration for verification. [`KeyValueService`] is that contract;
//! [`SledKeyValueService`] is the bundled implementation.

pub mod persistence;

pub use persistence::SledKeyValueService;

use crate::error::StorageError;
use crate::types::{Cell, TableRef, Timestamp, SENTINEL_TIMESTAMP};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored version of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub contents: Vec<u8>,
    pub timestamp: Timestamp,
}

impl Value {
    pub fn new(contents: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            contents,
            timestamp,
        }
    }

    /// The placeholder left by a conservative sweep.
    pub fn sentinel() -> Self {
        Self::new(Vec::new(), SENTINEL_TIMESTAMP)
    }

    pub fn is_sentinel(&self) -> bool {
        self.timestamp == SENTINEL_TIMESTAMP
    }
}

/// Parameters of a candidate scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCellRequest {
    /// Only versions strictly below this timestamp are reported.
    pub max_timestamp_exclusive: Timestamp,
    /// Leave sentinels out of the reported timestamps.
    pub ignore_sentinels: bool,
}

impl Default for CandidateCellRequest {
    fn default() -> Self {
        Self {
            max_timestamp_exclusive: Timestamp::MAX,
            ignore_sentinels: true,
        }
    }
}

/// A cell with versions a sweep could look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCell {
    pub cell: Cell,
    /// Ascending.
    pub sorted_timestamps: Vec<Timestamp>,
}

pub trait KeyValueService: Send + Sync {
    /// Writes `values` at `timestamp`. Timestamp 0 is reserved for sentinels.
    fn put(
        &self,
        table: &TableRef,
        values: &BTreeMap<Cell, Vec<u8>>,
        timestamp: Timestamp,
    ) -> Result<(), StorageError>;

    /// Newest version strictly below `max_ts_exclusive`, sentinels included.
    fn get_latest(
        &self,
        table: &TableRef,
        cell: &Cell,
        max_ts_exclusive: Timestamp,
    ) -> Result<Option<Value>, StorageError>;

    /// Every stored timestamp of a cell, ascending, sentinels included.
    fn get_all_timestamps(&self, table: &TableRef, cell: &Cell)
        -> Result<Vec<Timestamp>, StorageError>;

    /// Marks cells as swept so concurrent readers see an explicit deletion
    /// rather than a gap. Safe to repeat.
    fn add_garbage_collection_sentinel_values(
        &self,
        table: &TableRef,
        cells: &[Cell],
    ) -> Result<(), StorageError>;

    /// Deletes, per cell, every version at or below its cutoff. Sentinels are
    /// kept. Versions that are already gone are not an error.
    fn delete_all_timestamps(
        &self,
        table: &TableRef,
        cutoffs: &BTreeMap<Cell, Timestamp>,
    ) -> Result<(), StorageError>;

    /// Cells of `table` with at least one reportable version, in cell order.
    fn candidate_cells_for_sweeping(
        &self,
        table: &TableRef,
        request: &CandidateCellRequest,
    ) -> Result<Vec<CandidateCell>, StorageError>;
}
