//! Sled-backed versioned store.
//!
//! One tree per table. Keys are `row_len(4) | row | column_len(4) | column |
//! timestamp(8)`, big-endian, so all versions of a cell are contiguous and
//! ascending by timestamp.

use crate::error::StorageError;
use crate::kvs::{CandidateCell, CandidateCellRequest, KeyValueService, Value};
use crate::types::{Cell, TableRef, Timestamp, SENTINEL_TIMESTAMP};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, trace};

const TABLE_TREE_PREFIX: &str = "kvs/";

pub struct SledKeyValueService {
    db: sled::Db,
    tables: RwLock<HashMap<TableRef, sled::Tree>>,
}

impl SledKeyValueService {
    /// Open a store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::from_sled("Failed to open sled database", e))?;
        Ok(Self::with_db(db))
    }

    /// Share an already open database, e.g. with the sweep queue.
    pub fn with_db(db: sled::Db) -> Self {
        Self {
            db,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn tree_name(table: &TableRef) -> String {
        format!("{}{}", TABLE_TREE_PREFIX, table)
    }

    /// Tree for `table`, created on first use.
    fn table_tree(&self, table: &TableRef) -> Result<sled::Tree, StorageError> {
        if let Some(tree) = self.tables.read().get(table) {
            return Ok(tree.clone());
        }
        let tree = self
            .db
            .open_tree(Self::tree_name(table))
            .map_err(|e| StorageError::from_sled("Failed to open table", e))?;
        self.tables.write().insert(table.clone(), tree.clone());
        Ok(tree)
    }

    /// Tree for `table`, which must already hold data.
    fn existing_table_tree(&self, table: &TableRef) -> Result<sled::Tree, StorageError> {
        if let Some(tree) = self.tables.read().get(table) {
            return Ok(tree.clone());
        }
        let name = Self::tree_name(table);
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_bytes());
        if !exists {
            return Err(StorageError::TableNotFound(table.clone()));
        }
        self.table_tree(table)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::from_sled("Failed to flush database", e))?;
        Ok(())
    }
}

fn cell_prefix(cell: &Cell) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + cell.row.len() + cell.column.len() + 8);
    key.extend_from_slice(&(cell.row.len() as u32).to_be_bytes());
    key.extend_from_slice(&cell.row);
    key.extend_from_slice(&(cell.column.len() as u32).to_be_bytes());
    key.extend_from_slice(&cell.column);
    key
}

fn version_key(cell: &Cell, timestamp: Timestamp) -> Vec<u8> {
    let mut key = cell_prefix(cell);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key
}

fn decode_version_key(key: &[u8]) -> Option<(Cell, Timestamp)> {
    let (row, rest) = take_length_prefixed(key)?;
    let (column, rest) = take_length_prefixed(rest)?;
    let ts_bytes: [u8; 8] = rest.try_into().ok()?;
    Some((Cell::new(row, column), u64::from_be_bytes(ts_bytes)))
}

fn take_length_prefixed(bytes: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let len_bytes: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let body = bytes.get(4..4 + len)?;
    Some((body.to_vec(), &bytes[4 + len..]))
}

fn corrupt(table: &TableRef) -> StorageError {
    StorageError::CorruptKey {
        tree: "kvs",
        detail: format!("undecodable version key in table {}", table),
    }
}

impl KeyValueService for SledKeyValueService {
    fn put(
        &self,
        table: &TableRef,
        values: &BTreeMap<Cell, Vec<u8>>,
        timestamp: Timestamp,
    ) -> Result<(), StorageError> {
        if timestamp == SENTINEL_TIMESTAMP {
            return Err(StorageError::ReservedTimestamp(timestamp));
        }
        let tree = self.table_tree(table)?;
        let mut batch = sled::Batch::default();
        for (cell, contents) in values {
            batch.insert(version_key(cell, timestamp), contents.as_slice());
        }
        tree.apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to write values", e))?;
        trace!(%table, timestamp, cells = values.len(), "Stored values");
        Ok(())
    }

    fn get_latest(
        &self,
        table: &TableRef,
        cell: &Cell,
        max_ts_exclusive: Timestamp,
    ) -> Result<Option<Value>, StorageError> {
        if max_ts_exclusive == 0 {
            return Ok(None);
        }
        let tree = self.existing_table_tree(table)?;
        let start = version_key(cell, SENTINEL_TIMESTAMP);
        let end = version_key(cell, max_ts_exclusive - 1);
        match tree.range(start..=end).next_back() {
            Some(entry) => {
                let (key, value) =
                    entry.map_err(|e| StorageError::from_sled("Failed to read value", e))?;
                let (_, timestamp) = decode_version_key(&key).ok_or_else(|| corrupt(table))?;
                Ok(Some(Value::new(value.to_vec(), timestamp)))
            }
            None => Ok(None),
        }
    }

    fn get_all_timestamps(
        &self,
        table: &TableRef,
        cell: &Cell,
    ) -> Result<Vec<Timestamp>, StorageError> {
        let tree = self.existing_table_tree(table)?;
        let mut out = Vec::new();
        for entry in tree.scan_prefix(cell_prefix(cell)) {
            let (key, _) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan cell versions", e))?;
            let (_, timestamp) = decode_version_key(&key).ok_or_else(|| corrupt(table))?;
            out.push(timestamp);
        }
        Ok(out)
    }

    fn add_garbage_collection_sentinel_values(
        &self,
        table: &TableRef,
        cells: &[Cell],
    ) -> Result<(), StorageError> {
        let tree = self.table_tree(table)?;
        let sentinel = Value::sentinel();
        let mut batch = sled::Batch::default();
        for cell in cells {
            batch.insert(version_key(cell, sentinel.timestamp), sentinel.contents.clone());
        }
        tree.apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to write sentinels", e))?;
        debug!(%table, cells = cells.len(), "Added garbage collection sentinels");
        Ok(())
    }

    fn delete_all_timestamps(
        &self,
        table: &TableRef,
        cutoffs: &BTreeMap<Cell, Timestamp>,
    ) -> Result<(), StorageError> {
        let tree = self.table_tree(table)?;
        let mut batch = sled::Batch::default();
        let mut deleted = 0usize;
        for (cell, cutoff) in cutoffs {
            if *cutoff <= SENTINEL_TIMESTAMP {
                continue;
            }
            let start = version_key(cell, SENTINEL_TIMESTAMP + 1);
            let end = version_key(cell, *cutoff);
            for entry in tree.range(start..=end) {
                let (key, _) = entry
                    .map_err(|e| StorageError::from_sled("Failed to scan cell versions", e))?;
                batch.remove(key);
                deleted += 1;
            }
        }
        tree.apply_batch(batch)
            .map_err(|e| StorageError::from_sled("Failed to delete versions", e))?;
        debug!(%table, cells = cutoffs.len(), deleted, "Deleted stale versions");
        Ok(())
    }

    fn candidate_cells_for_sweeping(
        &self,
        table: &TableRef,
        request: &CandidateCellRequest,
    ) -> Result<Vec<CandidateCell>, StorageError> {
        let tree = self.existing_table_tree(table)?;
        let mut out: Vec<CandidateCell> = Vec::new();
        for entry in tree.iter() {
            let (key, _) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan table", e))?;
            let (cell, timestamp) = decode_version_key(&key).ok_or_else(|| corrupt(table))?;
            if timestamp >= request.max_timestamp_exclusive
                || (request.ignore_sentinels && timestamp == SENTINEL_TIMESTAMP)
            {
                continue;
            }
            match out.last_mut() {
                Some(last) if last.cell == cell => last.sorted_timestamps.push(timestamp),
                _ => out.push(CandidateCell {
                    cell,
                    sorted_timestamps: vec![timestamp],
                }),
            }
        }
        Ok(out)
    }
}
