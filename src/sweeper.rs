//! Targeted Sweeper
//!
//! Ties the queue, the table registry and the deleter together: callers
//! register tables, enqueue committed writes, and periodically ask for one
//! sweep cycle per shard.

use crate::config::QueueConfig;
use crate::deleter::SweepDeleter;
use crate::error::{StorageError, SweepError};
use crate::kvs::KeyValueService;
use crate::queue::{
    ShardLeaseManager, SweepQueueReader, SweepQueueTables, SweepQueueWriter, TimestampPartitioning,
};
use crate::registry::TableStrategyRegistry;
use crate::strategy::SweepStrategy;
use crate::types::{
    ShardAndStrategy, TableRef, Timestamp, WriteInfo, INITIAL_LAST_SWEPT_TIMESTAMP,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Progress of one shard+strategy, for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardProgress {
    pub shard_strategy: ShardAndStrategy,
    pub last_swept_timestamp: Timestamp,
    pub pending_writes: usize,
}

pub struct TargetedSweeper {
    tables: SweepQueueTables,
    registry: Arc<TableStrategyRegistry>,
    writer: SweepQueueWriter,
    leases: Arc<ShardLeaseManager>,
    kvs: Arc<dyn KeyValueService>,
    num_shards: u32,
}

impl TargetedSweeper {
    pub fn new(
        tables: SweepQueueTables,
        registry: Arc<TableStrategyRegistry>,
        kvs: Arc<dyn KeyValueService>,
        num_shards: u32,
    ) -> Self {
        let writer = SweepQueueWriter::new(&tables, Arc::clone(&registry), num_shards);
        Self {
            tables,
            registry,
            writer,
            leases: ShardLeaseManager::new(),
            kvs,
            num_shards: num_shards.max(1),
        }
    }

    /// Opens the queue and registry stored in `db`.
    pub fn open(
        db: &sled::Db,
        kvs: Arc<dyn KeyValueService>,
        config: &QueueConfig,
    ) -> Result<Self, StorageError> {
        let partitioning = TimestampPartitioning::new(config.coarse_partition_size);
        let tables = SweepQueueTables::open(db, partitioning)?;
        let registry = Arc::new(TableStrategyRegistry::new(db)?);
        Ok(Self::new(tables, registry, kvs, config.num_shards))
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    pub fn leases(&self) -> &Arc<ShardLeaseManager> {
        &self.leases
    }

    pub fn register_table(
        &self,
        table: &TableRef,
        strategy: SweepStrategy,
    ) -> Result<(), StorageError> {
        self.registry.register(table, strategy)
    }

    pub fn registry(&self) -> &TableStrategyRegistry {
        &self.registry
    }

    pub fn enqueue(&self, writes: &[WriteInfo]) -> Result<usize, StorageError> {
        self.writer.enqueue(writes)
    }

    /// Leases the shard and runs one cycle with a [`SweepDeleter`] as consumer.
    pub fn sweep_next_batch(
        &self,
        shard_strategy: ShardAndStrategy,
        max_ts_exclusive: Timestamp,
    ) -> Result<Timestamp, SweepError> {
        let lease = self
            .leases
            .try_acquire(shard_strategy)
            .ok_or(SweepError::LeaseUnavailable(shard_strategy))?;
        let reader = SweepQueueReader::new(&self.tables, lease);
        let deleter = SweepDeleter::new(Arc::clone(&self.kvs), shard_strategy.strategy);
        reader.consume_next_batch(|writes| deleter.sweep(writes), max_ts_exclusive)
    }

    /// Runs cycles on one shard until it has swept everything below
    /// `max_ts_exclusive`, and returns the progress reached.
    pub fn sweep_shard_to(
        &self,
        shard_strategy: ShardAndStrategy,
        max_ts_exclusive: Timestamp,
    ) -> Result<Timestamp, SweepError> {
        let target = max_ts_exclusive.saturating_sub(1);
        let mut previous = None;
        loop {
            let reached = self.sweep_next_batch(shard_strategy, max_ts_exclusive)?;
            if reached >= target || previous == Some(reached) {
                return Ok(reached);
            }
            previous = Some(reached);
        }
    }

    /// Runs one cycle on every shard of both strategies in parallel.
    pub async fn sweep_all_shards(
        self: &Arc<Self>,
        max_ts_exclusive: Timestamp,
    ) -> Vec<(ShardAndStrategy, Result<Timestamp, SweepError>)> {
        self.on_all_shards(move |sweeper, shard_strategy| {
            sweeper.sweep_next_batch(shard_strategy, max_ts_exclusive)
        })
        .await
    }

    /// Like [`Self::sweep_all_shards`], but each shard keeps going until it
    /// has caught up with `max_ts_exclusive`.
    pub async fn drain_all_shards(
        self: &Arc<Self>,
        max_ts_exclusive: Timestamp,
    ) -> Vec<(ShardAndStrategy, Result<Timestamp, SweepError>)> {
        self.on_all_shards(move |sweeper, shard_strategy| {
            sweeper.sweep_shard_to(shard_strategy, max_ts_exclusive)
        })
        .await
    }

    async fn on_all_shards<F>(
        self: &Arc<Self>,
        work: F,
    ) -> Vec<(ShardAndStrategy, Result<Timestamp, SweepError>)>
    where
        F: Fn(&TargetedSweeper, ShardAndStrategy) -> Result<Timestamp, SweepError>
            + Clone
            + Send
            + 'static,
    {
        let shards = ShardAndStrategy::all(self.num_shards);
        let handles: Vec<_> = shards
            .iter()
            .map(|shard_strategy| {
                let sweeper = Arc::clone(self);
                let shard_strategy = *shard_strategy;
                let work = work.clone();
                tokio::task::spawn_blocking(move || work(&sweeper, shard_strategy))
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .zip(shards)
            .map(|(joined, shard_strategy)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(SweepError::Worker {
                        shard_strategy,
                        detail: e.to_string(),
                    })
                });
                if let Err(err) = &result {
                    warn!(%shard_strategy, error = %err, "Sweep cycle failed");
                }
                (shard_strategy, result)
            })
            .collect();

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(shards = results.len(), failed, "Finished sweeping all shards");
        results
    }

    pub fn last_swept_timestamp(
        &self,
        shard_strategy: ShardAndStrategy,
    ) -> Result<Timestamp, StorageError> {
        self.tables.progress.last_swept_timestamp(shard_strategy)
    }

    /// Progress and backlog of every shard of both strategies.
    pub fn progress(&self) -> Result<Vec<ShardProgress>, StorageError> {
        let recorded: HashMap<ShardAndStrategy, Timestamp> =
            self.tables.progress.list()?.into_iter().collect();
        ShardAndStrategy::all(self.num_shards)
            .into_iter()
            .map(|shard_strategy| {
                Ok(ShardProgress {
                    shard_strategy,
                    last_swept_timestamp: recorded
                        .get(&shard_strategy)
                        .copied()
                        .unwrap_or(INITIAL_LAST_SWEPT_TIMESTAMP),
                    pending_writes: self.tables.cells.pending_writes(shard_strategy)?,
                })
            })
            .collect()
    }
}
