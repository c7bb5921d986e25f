//! Sweep Queue
//!
//! Sharded two-level index of writes waiting to be swept, the progress that
//! makes sweeping resumable, and the reader that feeds batches to a consumer.
//!
//! Writes are sharded by cell and split by their table's strategy. Each
//! shard+strategy is swept independently, lowest timestamp first.

pub mod cells;
pub mod keys;
pub mod lease;
pub mod progress;
pub mod reader;
pub mod scrubber;
pub mod timestamps;
pub mod writer;

pub use cells::{SledSweepableCells, SweepableCells};
pub use keys::TimestampPartitioning;
pub use lease::{ShardLease, ShardLeaseManager};
pub use progress::{SledSweepProgress, SweepProgress};
pub use reader::{CycleState, SweepQueueReader};
pub use scrubber::SweepQueueScrubber;
pub use timestamps::{SledSweepableTimestamps, SweepableTimestamps};
pub use writer::SweepQueueWriter;

use crate::error::StorageError;
use std::sync::Arc;

/// The three persistent structures behind a sweep queue.
#[derive(Clone)]
pub struct SweepQueueTables {
    pub timestamps: Arc<dyn SweepableTimestamps>,
    pub cells: Arc<dyn SweepableCells>,
    pub progress: Arc<dyn SweepProgress>,
}

impl SweepQueueTables {
    pub fn new(
        timestamps: Arc<dyn SweepableTimestamps>,
        cells: Arc<dyn SweepableCells>,
        progress: Arc<dyn SweepProgress>,
    ) -> Self {
        Self {
            timestamps,
            cells,
            progress,
        }
    }

    /// Opens the sled-backed queue inside `db`.
    pub fn open(db: &sled::Db, partitioning: TimestampPartitioning) -> Result<Self, StorageError> {
        Ok(Self::new(
            Arc::new(SledSweepableTimestamps::new(db, partitioning)?),
            Arc::new(SledSweepableCells::new(db, partitioning)?),
            Arc::new(SledSweepProgress::new(db)?),
        ))
    }
}
