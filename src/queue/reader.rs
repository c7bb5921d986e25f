//! Sweep queue reader: one cycle of progress → partition → batch → consumer →
//! scrub → advance for a single leased shard.

use crate::error::{StorageError, SweepError};
use crate::queue::lease::ShardLease;
use crate::queue::scrubber::SweepQueueScrubber;
use crate::queue::SweepQueueTables;
use crate::types::{ShardAndStrategy, SweepBatch, Timestamp, WriteInfo};
use std::fmt;
use tracing::{debug, trace};

/// Step of a sweep cycle. Errors carry the step they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    FetchingProgress,
    LocatingPartition,
    LoadingBatch,
    Consuming,
    Scrubbing,
    Advancing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::FetchingProgress => "fetching progress",
            CycleState::LocatingPartition => "locating partition",
            CycleState::LoadingBatch => "loading batch",
            CycleState::Consuming => "consuming",
            CycleState::Scrubbing => "scrubbing",
            CycleState::Advancing => "advancing",
        };
        f.write_str(name)
    }
}

pub struct SweepQueueReader {
    tables: SweepQueueTables,
    scrubber: SweepQueueScrubber,
    lease: ShardLease,
}

impl SweepQueueReader {
    pub fn new(tables: &SweepQueueTables, lease: ShardLease) -> Self {
        let scrubber = SweepQueueScrubber::new(
            tables.cells.clone(),
            tables.timestamps.clone(),
            tables.progress.clone(),
        );
        Self {
            tables: tables.clone(),
            scrubber,
            lease,
        }
    }

    pub fn shard_strategy(&self) -> ShardAndStrategy {
        self.lease.shard_strategy()
    }

    /// Runs one sweep cycle and returns the shard's new progress.
    ///
    /// `consumer` receives the batch's writes (possibly none) and must dispose
    /// of them. If it fails, nothing is scrubbed and progress stays put, so the
    /// same range is offered again on the next call. `max_ts_exclusive` must not
    /// exceed the oldest timestamp any active reader may still read at.
    pub fn consume_next_batch<F>(
        &self,
        consumer: F,
        max_ts_exclusive: Timestamp,
    ) -> Result<Timestamp, SweepError>
    where
        F: FnOnce(&[WriteInfo]) -> Result<(), StorageError>,
    {
        let shard_strategy = self.shard_strategy();

        self.enter(CycleState::FetchingProgress);
        let previous_last_swept = self
            .tables
            .progress
            .last_swept_timestamp(shard_strategy)
            .map_err(|source| self.read_error(CycleState::FetchingProgress, source))?;

        let batch = self.next_batch(previous_last_swept, max_ts_exclusive)?;
        self.check_batch(&batch, previous_last_swept, max_ts_exclusive)?;

        self.enter(CycleState::Consuming);
        consumer(&batch.writes).map_err(|source| SweepError::Consumer {
            shard_strategy,
            source,
        })?;

        self.enter(CycleState::Scrubbing);
        self.scrubber
            .scrub(shard_strategy, previous_last_swept, batch.last_swept_timestamp)?;

        self.enter(CycleState::Advancing);
        self.scrubber
            .advance(shard_strategy, batch.last_swept_timestamp)?;
        self.enter(CycleState::Idle);

        debug!(
            %shard_strategy,
            previous = previous_last_swept,
            last_swept = batch.last_swept_timestamp,
            writes = batch.writes.len(),
            "Completed sweep cycle"
        );
        Ok(batch.last_swept_timestamp)
    }

    fn next_batch(
        &self,
        last_swept: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<SweepBatch, SweepError> {
        let shard_strategy = self.shard_strategy();

        self.enter(CycleState::LocatingPartition);
        let partition = self
            .tables
            .timestamps
            .next_sweepable_timestamp_partition(shard_strategy, last_swept, max_ts_exclusive)
            .map_err(|source| self.read_error(CycleState::LocatingPartition, source))?;

        let Some(partition) = partition else {
            // Nothing queued below the ceiling: still advance so the empty range
            // is not scanned again.
            let watermark = max_ts_exclusive.saturating_sub(1).max(last_swept);
            return Ok(SweepBatch::empty(watermark));
        };

        self.enter(CycleState::LoadingBatch);
        self.tables
            .cells
            .get_batch_for_partition(shard_strategy, partition, last_swept, max_ts_exclusive)
            .map_err(|source| self.read_error(CycleState::LoadingBatch, source))
    }

    fn check_batch(
        &self,
        batch: &SweepBatch,
        previous_last_swept: Timestamp,
        max_ts_exclusive: Timestamp,
    ) -> Result<(), SweepError> {
        let watermark = batch.last_swept_timestamp;
        let detail = if watermark < previous_last_swept {
            Some(format!(
                "watermark {} is below current progress {}",
                watermark, previous_last_swept
            ))
        } else if watermark > previous_last_swept && watermark >= max_ts_exclusive {
            Some(format!(
                "watermark {} is not below the ceiling {}",
                watermark, max_ts_exclusive
            ))
        } else {
            batch
                .writes
                .iter()
                .find(|w| w.start_timestamp <= previous_last_swept || w.start_timestamp > watermark)
                .map(|w| {
                    format!(
                        "write at {} outside ({}, {}]",
                        w.start_timestamp, previous_last_swept, watermark
                    )
                })
        };

        match detail {
            Some(detail) => Err(SweepError::InvariantViolation {
                shard_strategy: self.shard_strategy(),
                detail,
            }),
            None => Ok(()),
        }
    }

    fn enter(&self, state: CycleState) {
        trace!(shard_strategy = %self.shard_strategy(), %state, "Sweep cycle state");
    }

    fn read_error(&self, state: CycleState, source: StorageError) -> SweepError {
        SweepError::Read {
            shard_strategy: self.shard_strategy(),
            state,
            source,
        }
    }
}
