//! Removes consumed entries from both index levels and advances progress.

use crate::error::SweepError;
use crate::queue::cells::SweepableCells;
use crate::queue::progress::SweepProgress;
use crate::queue::timestamps::SweepableTimestamps;
use crate::types::{ShardAndStrategy, Timestamp};
use std::sync::Arc;
use tracing::debug;

pub struct SweepQueueScrubber {
    cells: Arc<dyn SweepableCells>,
    timestamps: Arc<dyn SweepableTimestamps>,
    progress: Arc<dyn SweepProgress>,
}

impl SweepQueueScrubber {
    pub fn new(
        cells: Arc<dyn SweepableCells>,
        timestamps: Arc<dyn SweepableTimestamps>,
        progress: Arc<dyn SweepProgress>,
    ) -> Self {
        Self {
            cells,
            timestamps,
            progress,
        }
    }

    /// Drops index entries in `(previous_last_swept, new_last_swept]`.
    ///
    /// Cells go before timestamps: a marker with no cells behind it only costs
    /// an empty batch, while cells with no marker would never be read again.
    pub fn scrub(
        &self,
        shard_strategy: ShardAndStrategy,
        previous_last_swept: Timestamp,
        new_last_swept: Timestamp,
    ) -> Result<(), SweepError> {
        self.cells
            .delete_through(shard_strategy, previous_last_swept, new_last_swept)
            .and_then(|_| {
                self.timestamps
                    .delete_through(shard_strategy, previous_last_swept, new_last_swept)
            })
            .map_err(|source| SweepError::Scrub {
                shard_strategy,
                source,
            })?;

        debug!(
            %shard_strategy,
            previous = previous_last_swept,
            last_swept = new_last_swept,
            "Scrubbed sweep queue"
        );
        Ok(())
    }

    /// Records `new_last_swept` as the shard's progress. Only call after
    /// [`Self::scrub`] succeeded for the same range.
    pub fn advance(
        &self,
        shard_strategy: ShardAndStrategy,
        new_last_swept: Timestamp,
    ) -> Result<(), SweepError> {
        self.progress
            .update_last_swept_timestamp(shard_strategy, new_last_swept)
            .map_err(|source| SweepError::Advance {
                shard_strategy,
                source,
            })
    }
}
