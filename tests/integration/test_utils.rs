//! Shared test utilities for integration tests
//!
//! Queue fixtures backed by a throwaway sled database, plus in-memory fakes
//! for the pieces a test needs to observe or break.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sweepq::error::StorageError;
use sweepq::kvs::{CandidateCell, CandidateCellRequest, KeyValueService, Value};
use sweepq::queue::{
    SledSweepProgress, SledSweepableCells, SweepProgress, SweepQueueTables, SweepableCells,
    TimestampPartitioning,
};
use sweepq::registry::TableStrategyRegistry;
use sweepq::types::{Cell, ShardAndStrategy, SweepBatch, TableRef, Timestamp, WriteInfo};
use tempfile::TempDir;

pub const PARTITION_SIZE: u64 = 100;

/// A sled database in a temp dir with the queue opened inside it.
pub struct QueueFixture {
    pub db: sled::Db,
    pub tables: SweepQueueTables,
    _dir: TempDir,
}

impl QueueFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let tables = SweepQueueTables::open(&db, TimestampPartitioning::new(PARTITION_SIZE)).unwrap();
        Self {
            db,
            tables,
            _dir: dir,
        }
    }

    pub fn registry(&self) -> Arc<TableStrategyRegistry> {
        Arc::new(TableStrategyRegistry::new(&self.db).unwrap())
    }

    /// Queues writes for one shard directly, bypassing shard assignment.
    pub fn enqueue(&self, shard_strategy: ShardAndStrategy, writes: &[WriteInfo]) {
        let partitions: BTreeSet<u64> = writes
            .iter()
            .map(|w| self.tables.timestamps.partitioning().partition_of(w.start_timestamp))
            .collect();
        self.tables.cells.enqueue(shard_strategy, writes).unwrap();
        self.tables
            .timestamps
            .enqueue(shard_strategy, &partitions)
            .unwrap();
    }

    pub fn set_progress(&self, shard_strategy: ShardAndStrategy, ts: Timestamp) {
        self.tables
            .progress
            .update_last_swept_timestamp(shard_strategy, ts)
            .unwrap();
    }

    pub fn progress(&self, shard_strategy: ShardAndStrategy) -> Timestamp {
        self.tables
            .progress
            .last_swept_timestamp(shard_strategy)
            .unwrap()
    }

    pub fn pending(&self, shard_strategy: ShardAndStrategy) -> usize {
        self.tables.cells.pending_writes(shard_strategy).unwrap()
    }
}

pub fn cell(row: &str) -> Cell {
    Cell::new(row.as_bytes().to_vec(), b"c".to_vec())
}

pub fn write(table: &str, row: &str, ts: Timestamp) -> WriteInfo {
    WriteInfo::new(TableRef::new(table), cell(row), ts)
}

/// Calls observed by [`RecordingKvs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvsCall {
    Sentinels {
        table: TableRef,
        cells: Vec<Cell>,
    },
    Delete {
        table: TableRef,
        cutoffs: BTreeMap<Cell, Timestamp>,
    },
}

/// Key-value service that only records sweep calls. Deletes against
/// `fail_table` fail.
#[derive(Default)]
pub struct RecordingKvs {
    calls: Mutex<Vec<KvsCall>>,
    fail_table: Option<TableRef>,
}

impl RecordingKvs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(table: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_table: Some(TableRef::new(table)),
        })
    }

    pub fn calls(&self) -> Vec<KvsCall> {
        self.calls.lock().clone()
    }

    pub fn as_kvs(self: &Arc<Self>) -> Arc<dyn KeyValueService> {
        Arc::clone(self) as Arc<dyn KeyValueService>
    }
}

impl KeyValueService for RecordingKvs {
    fn put(
        &self,
        _table: &TableRef,
        _values: &BTreeMap<Cell, Vec<u8>>,
        _timestamp: Timestamp,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    fn get_latest(
        &self,
        _table: &TableRef,
        _cell: &Cell,
        _max_ts_exclusive: Timestamp,
    ) -> Result<Option<Value>, StorageError> {
        Ok(None)
    }

    fn get_all_timestamps(
        &self,
        _table: &TableRef,
        _cell: &Cell,
    ) -> Result<Vec<Timestamp>, StorageError> {
        Ok(Vec::new())
    }

    fn add_garbage_collection_sentinel_values(
        &self,
        table: &TableRef,
        cells: &[Cell],
    ) -> Result<(), StorageError> {
        self.calls.lock().push(KvsCall::Sentinels {
            table: table.clone(),
            cells: cells.to_vec(),
        });
        Ok(())
    }

    fn delete_all_timestamps(
        &self,
        table: &TableRef,
        cutoffs: &BTreeMap<Cell, Timestamp>,
    ) -> Result<(), StorageError> {
        if self.fail_table.as_ref() == Some(table) {
            return Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected delete failure",
            )));
        }
        self.calls.lock().push(KvsCall::Delete {
            table: table.clone(),
            cutoffs: cutoffs.clone(),
        });
        Ok(())
    }

    fn candidate_cells_for_sweeping(
        &self,
        _table: &TableRef,
        _request: &CandidateCellRequest,
    ) -> Result<Vec<CandidateCell>, StorageError> {
        Ok(Vec::new())
    }
}

/// Sled-backed fine index whose scrub can be switched to fail.
pub struct FlakyCells {
    inner: SledSweepableCells,
    pub fail_scrub: AtomicBool,
}

impl FlakyCells {
    pub fn new(db: &sled::Db) -> Arc<Self> {
        Arc::new(Self {
            inner: SledSweepableCells::new(db, TimestampPartitioning::new(PARTITION_SIZE)).unwrap(),
            fail_scrub: AtomicBool::new(false),
        })
    }
}

impl SweepableCells for FlakyCells {
    fn get_batch_for_partition(
        &self,
        shard_strategy: ShardAndStrategy,
        partition: u64,
        last_swept_ts: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<SweepBatch, StorageError> {
        self.inner
            .get_batch_for_partition(shard_strategy, partition, last_swept_ts, max_ts_exclusive)
    }

    fn enqueue(
        &self,
        shard_strategy: ShardAndStrategy,
        writes: &[WriteInfo],
    ) -> Result<(), StorageError> {
        self.inner.enqueue(shard_strategy, writes)
    }

    fn delete_through(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), StorageError> {
        if self.fail_scrub.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected scrub failure",
            )));
        }
        self.inner
            .delete_through(shard_strategy, previous_last_swept, new_last_swept)
    }

    fn pending_writes(&self, shard_strategy: ShardAndStrategy) -> Result<usize, StorageError> {
        self.inner.pending_writes(shard_strategy)
    }
}

/// Fine index that always hands back a fixed batch, however wrong.
pub struct FixedBatchCells {
    pub batch: SweepBatch,
}

impl SweepableCells for FixedBatchCells {
    fn get_batch_for_partition(
        &self,
        _shard_strategy: ShardAndStrategy,
        _partition: u64,
        _last_swept_ts: Timestamp,
        _max_ts_exclusive: Timestamp,
    ) -> Result<SweepBatch, StorageError> {
        Ok(self.batch.clone())
    }

    fn enqueue(
        &self,
        _shard_strategy: ShardAndStrategy,
        _writes: &[WriteInfo],
    ) -> Result<(), StorageError> {
        Ok(())
    }

    fn delete_through(
        &self,
        _shard_strategy: ShardAndStrategy,
        _previous_last_swept: Timestamp,
        _new_last_swept: Timestamp,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    fn pending_writes(&self, _shard_strategy: ShardAndStrategy) -> Result<usize, StorageError> {
        Ok(0)
    }
}

/// Progress table that cannot be read.
pub struct UnreadableProgress;

impl SweepProgress for UnreadableProgress {
    fn last_swept_timestamp(
        &self,
        _shard_strategy: ShardAndStrategy,
    ) -> Result<Timestamp, StorageError> {
        Err(StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "progress unavailable",
        )))
    }

    fn update_last_swept_timestamp(
        &self,
        _shard_strategy: ShardAndStrategy,
        _timestamp: Timestamp,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    fn list(&self) -> Result<Vec<(ShardAndStrategy, Timestamp)>, StorageError> {
        Ok(Vec::new())
    }
}

/// Sled-backed progress whose watermark updates can be switched to fail.
pub struct FlakyProgress {
    inner: SledSweepProgress,
    pub fail_updates: AtomicBool,
}

impl FlakyProgress {
    pub fn new(db: &sled::Db) -> Arc<Self> {
        Arc::new(Self {
            inner: SledSweepProgress::new(db).unwrap(),
            fail_updates: AtomicBool::new(false),
        })
    }
}

impl SweepProgress for FlakyProgress {
    fn last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
    ) -> Result<Timestamp, StorageError> {
        self.inner.last_swept_timestamp(shard_strategy)
    }

    fn update_last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
        timestamp: Timestamp,
    ) -> Result<(), StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected progress failure",
            )));
        }
        self.inner.update_last_swept_timestamp(shard_strategy, timestamp)
    }

    fn list(&self) -> Result<Vec<(ShardAndStrategy, Timestamp)>, StorageError> {
        self.inner.list()
    }
}
