//! End-to-end sweeper tests: register, write, enqueue, sweep, then inspect the
//! store.

use crate::integration::test_utils::{cell, write};
use std::collections::BTreeMap;
use std::sync::Arc;
use sweepq::config::QueueConfig;
use sweepq::error::{StorageError, SweepError};
use sweepq::kvs::{KeyValueService, SledKeyValueService};
use sweepq::types::{ShardAndStrategy, TableRef, Timestamp, WriteInfo};
use sweepq::{SweepStrategy, TargetedSweeper};
use tempfile::TempDir;

struct Harness {
    kvs: Arc<SledKeyValueService>,
    sweeper: Arc<TargetedSweeper>,
    _dir: TempDir,
}

impl Harness {
    fn new(num_shards: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let kvs = Arc::new(SledKeyValueService::new(dir.path().join("db")).unwrap());
        let config = QueueConfig {
            num_shards,
            coarse_partition_size: 100,
        };
        let sweeper = TargetedSweeper::open(kvs.db(), kvs.clone(), &config).unwrap();
        Self {
            kvs,
            sweeper: Arc::new(sweeper),
            _dir: dir,
        }
    }

    /// Writes a value and queues the write, the way a committing transaction would.
    fn commit(&self, table: &str, row: &str, ts: Timestamp) -> usize {
        let values = BTreeMap::from([(cell(row), format!("v{}", ts).into_bytes())]);
        self.kvs.put(&TableRef::new(table), &values, ts).unwrap();
        self.sweeper.enqueue(&[write(table, row, ts)]).unwrap()
    }

    fn timestamps(&self, table: &str, row: &str) -> Vec<Timestamp> {
        self.kvs
            .get_all_timestamps(&TableRef::new(table), &cell(row))
            .unwrap()
    }

    fn shard_of(&self, table: &str, row: &str, strategy: SweepStrategy) -> ShardAndStrategy {
        let shard = write(table, row, 1).shard(self.sweeper.num_shards());
        ShardAndStrategy::new(shard, strategy)
    }
}

#[test]
fn conservative_table_keeps_latest_and_sentinel() {
    let h = Harness::new(4);
    h.sweeper
        .register_table(&TableRef::new("t"), SweepStrategy::Conservative)
        .unwrap();
    for ts in [10, 20, 30] {
        assert_eq!(h.commit("t", "a", ts), 1);
    }

    let shard = h.shard_of("t", "a", SweepStrategy::Conservative);
    assert_eq!(h.sweeper.sweep_shard_to(shard, 40).unwrap(), 39);

    assert_eq!(h.timestamps("t", "a"), vec![0, 30]);
    assert_eq!(h.sweeper.last_swept_timestamp(shard).unwrap(), 39);
}

#[test]
fn thorough_table_loses_every_swept_version() {
    let h = Harness::new(4);
    h.sweeper
        .register_table(&TableRef::new("t"), SweepStrategy::Thorough)
        .unwrap();
    for ts in [10, 20, 30] {
        h.commit("t", "a", ts);
    }

    let shard = h.shard_of("t", "a", SweepStrategy::Thorough);
    h.sweeper.sweep_shard_to(shard, 40).unwrap();

    assert!(h.timestamps("t", "a").is_empty());
}

#[test]
fn writes_at_or_above_ceiling_wait_for_a_later_sweep() {
    let h = Harness::new(2);
    h.sweeper
        .register_table(&TableRef::new("t"), SweepStrategy::Conservative)
        .unwrap();
    for ts in [10, 20, 30] {
        h.commit("t", "a", ts);
    }
    let shard = h.shard_of("t", "a", SweepStrategy::Conservative);

    h.sweeper.sweep_shard_to(shard, 25).unwrap();
    assert_eq!(h.timestamps("t", "a"), vec![0, 20, 30]);

    h.sweeper.sweep_shard_to(shard, 40).unwrap();
    assert_eq!(h.timestamps("t", "a"), vec![0, 30]);
}

#[test]
fn unregistered_tables_are_not_queued() {
    let h = Harness::new(4);

    assert_eq!(h.commit("nobody", "a", 10), 0);

    let pending: usize = h.sweeper.progress().unwrap().iter().map(|p| p.pending_writes).sum();
    assert_eq!(pending, 0);
}

#[test]
fn registering_a_different_strategy_conflicts() {
    let h = Harness::new(1);
    let table = TableRef::new("t");
    h.sweeper.register_table(&table, SweepStrategy::Thorough).unwrap();
    h.sweeper.register_table(&table, SweepStrategy::Thorough).unwrap();

    let err = h
        .sweeper
        .register_table(&table, SweepStrategy::Conservative)
        .unwrap_err();

    assert!(matches!(err, StorageError::StrategyConflict { .. }));
    assert_eq!(
        h.sweeper.registry().strategy_for(&table).unwrap(),
        Some(SweepStrategy::Thorough)
    );
}

#[test]
fn held_lease_blocks_a_second_sweeper_cycle() {
    let h = Harness::new(1);
    let shard = ShardAndStrategy::conservative(0);
    let _lease = h.sweeper.leases().try_acquire(shard).unwrap();

    let err = h.sweeper.sweep_next_batch(shard, 100).unwrap_err();

    assert!(matches!(err, SweepError::LeaseUnavailable(s) if s == shard));
    assert!(err.is_retryable());
}

#[test]
fn progress_reports_backlog_per_shard() {
    let h = Harness::new(2);
    h.sweeper
        .register_table(&TableRef::new("t"), SweepStrategy::Thorough)
        .unwrap();
    h.commit("t", "a", 5);
    h.commit("t", "a", 6);
    let shard = h.shard_of("t", "a", SweepStrategy::Thorough);

    let progress = h.sweeper.progress().unwrap();
    assert_eq!(progress.len(), 4);
    let entry = progress.iter().find(|p| p.shard_strategy == shard).unwrap();
    assert_eq!(entry.pending_writes, 2);
    assert_eq!(entry.last_swept_timestamp, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_all_shards_sweeps_every_table() {
    let h = Harness::new(4);
    h.sweeper
        .register_table(&TableRef::new("cons"), SweepStrategy::Conservative)
        .unwrap();
    h.sweeper
        .register_table(&TableRef::new("thor"), SweepStrategy::Thorough)
        .unwrap();

    let rows: Vec<String> = (0..24).map(|i| format!("row{}", i)).collect();
    let mut writes: Vec<WriteInfo> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let ts = 10 + i as Timestamp * 15;
        for table in ["cons", "thor"] {
            for version in [ts, ts + 1] {
                let values = BTreeMap::from([(cell(row), b"v".to_vec())]);
                h.kvs.put(&TableRef::new(table), &values, version).unwrap();
                writes.push(write(table, row, version));
            }
        }
    }
    assert_eq!(h.sweeper.enqueue(&writes).unwrap(), writes.len());

    let results = h.sweeper.drain_all_shards(1_000).await;

    assert_eq!(results.len(), 8);
    for (shard, result) in &results {
        assert_eq!(result.as_ref().unwrap(), &999, "shard {}", shard);
    }
    for (i, row) in rows.iter().enumerate() {
        let ts = 10 + i as Timestamp * 15;
        assert_eq!(h.timestamps("cons", row), vec![0, ts + 1]);
        assert!(h.timestamps("thor", row).is_empty());
    }
    assert!(h.sweeper.progress().unwrap().iter().all(|p| p.pending_writes == 0));
}

#[tokio::test]
async fn sweep_all_shards_runs_one_cycle_each() {
    let h = Harness::new(3);
    h.sweeper
        .register_table(&TableRef::new("t"), SweepStrategy::Conservative)
        .unwrap();
    h.commit("t", "a", 50);
    h.commit("t", "a", 250);
    let shard = h.shard_of("t", "a", SweepStrategy::Conservative);

    let results = h.sweeper.sweep_all_shards(1_000).await;

    assert_eq!(results.len(), 6);
    for (s, result) in results {
        let expected = if s == shard { 99 } else { 999 };
        assert_eq!(result.unwrap(), expected, "shard {}", s);
    }
    assert_eq!(h.timestamps("t", "a"), vec![0, 50, 250]);
    assert!(!h.sweeper.leases().is_held(shard));
}
