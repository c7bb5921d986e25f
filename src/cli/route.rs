//! CLI route: opens the store once and dispatches each command to the sweeper.

use crate::cli::parse::Commands;
use crate::cli::presentation;
use crate::config::SweepConfig;
use crate::error::ApiError;
use crate::kvs::{CandidateCellRequest, KeyValueService, SledKeyValueService};
use crate::strategy::SweepStrategy;
use crate::sweeper::TargetedSweeper;
use crate::types::{Cell, ShardAndStrategy, TableRef, Timestamp, WriteInfo};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct RunContext {
    kvs: Arc<SledKeyValueService>,
    sweeper: Arc<TargetedSweeper>,
}

impl RunContext {
    pub fn new(config: &SweepConfig) -> Result<Self, ApiError> {
        let kvs = Arc::new(SledKeyValueService::new(&config.storage.db_path)?);
        let sweeper = TargetedSweeper::open(
            kvs.db(),
            Arc::clone(&kvs) as Arc<dyn KeyValueService>,
            &config.queue,
        )?;
        info!(db_path = %config.storage.db_path.display(), "Opened sweep store");
        Ok(Self {
            kvs,
            sweeper: Arc::new(sweeper),
        })
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let output = match command {
            Commands::Register { table, strategy } => {
                let strategy = parse_strategy(strategy)?;
                let table = TableRef::new(table.as_str());
                self.sweeper.register_table(&table, strategy)?;
                format!("Registered {} as {}", table, strategy)
            }
            Commands::Put {
                table,
                row,
                column,
                value,
                timestamp,
            } => self.put(table, row, column, value, *timestamp)?,
            Commands::Sweep {
                max_ts,
                shard,
                strategy,
                drain,
            } => self.sweep(*max_ts, *shard, strategy.as_deref(), *drain)?,
            Commands::Status { json } => {
                let progress = self.sweeper.progress()?;
                let tables = self.sweeper.registry().list()?;
                if *json {
                    presentation::format_status_json(&progress, &tables)
                } else {
                    presentation::format_status_text(&progress, &tables)
                }
            }
            Commands::Cells {
                table,
                max_ts,
                include_sentinels,
            } => {
                let request = CandidateCellRequest {
                    max_timestamp_exclusive: max_ts.unwrap_or(Timestamp::MAX),
                    ignore_sentinels: !include_sentinels,
                };
                let candidates = self
                    .kvs
                    .candidate_cells_for_sweeping(&TableRef::new(table.as_str()), &request)?;
                presentation::format_candidates(&candidates)
            }
        };
        self.kvs.flush()?;
        Ok(output)
    }

    fn put(
        &self,
        table: &str,
        row: &str,
        column: &str,
        value: &str,
        timestamp: Timestamp,
    ) -> Result<String, ApiError> {
        let table = TableRef::new(table);
        let cell = Cell::new(row.as_bytes().to_vec(), column.as_bytes().to_vec());
        let values = BTreeMap::from([(cell.clone(), value.as_bytes().to_vec())]);
        self.kvs.put(&table, &values, timestamp)?;
        let queued = self
            .sweeper
            .enqueue(&[WriteInfo::new(table.clone(), cell.clone(), timestamp)])?;
        Ok(if queued == 0 {
            format!("Wrote {}:{} at {} (table not registered, not queued)", table, cell, timestamp)
        } else {
            format!("Wrote {}:{} at {}", table, cell, timestamp)
        })
    }

    fn sweep(
        &self,
        max_ts: Timestamp,
        shard: Option<u32>,
        strategy: Option<&str>,
        drain: bool,
    ) -> Result<String, ApiError> {
        if let (Some(shard), Some(strategy)) = (shard, strategy) {
            if shard >= self.sweeper.num_shards() {
                return Err(ApiError::InvalidArgument(format!(
                    "Shard {} out of range (queue has {} shards)",
                    shard,
                    self.sweeper.num_shards()
                )));
            }
            let shard_strategy = ShardAndStrategy::new(shard, parse_strategy(strategy)?);
            let reached = if drain {
                self.sweeper.sweep_shard_to(shard_strategy, max_ts)?
            } else {
                self.sweeper.sweep_next_batch(shard_strategy, max_ts)?
            };
            return Ok(format!("Shard {} swept through {}", shard_strategy, reached));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start runtime: {}", e)))?;
        let sweeper = Arc::clone(&self.sweeper);
        let results = runtime.block_on(async move {
            if drain {
                sweeper.drain_all_shards(max_ts).await
            } else {
                sweeper.sweep_all_shards(max_ts).await
            }
        });
        let report = presentation::format_sweep_results(&results);
        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        if failed > 0 {
            return Err(ApiError::ShardsFailed {
                failed,
                total: results.len(),
                report,
            });
        }
        Ok(report)
    }
}

fn parse_strategy(raw: &str) -> Result<SweepStrategy, ApiError> {
    raw.parse().map_err(ApiError::InvalidArgument)
}
