//! Error types for the sweep queue engine.

use crate::queue::CycleState;
use crate::types::{ShardAndStrategy, TableRef};
use crate::strategy::SweepStrategy;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(TableRef),

    #[error("Table {table} is already registered with strategy {existing}, refusing {requested}")]
    StrategyConflict {
        table: TableRef,
        existing: SweepStrategy,
        requested: SweepStrategy,
    },

    #[error("Invalid timestamp {0}: timestamp 0 is reserved for sentinels")]
    ReservedTimestamp(u64),

    #[error("Corrupt key in {tree}: {detail}")]
    CorruptKey { tree: &'static str, detail: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn from_sled(context: &str, err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {}", context, err),
        ))
    }

    pub(crate) fn from_codec(context: &str, err: bincode::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", context, err),
        ))
    }
}

/// Failure of a single sweep cycle.
///
/// Every variant except [`SweepError::InvariantViolation`] leaves the queue in a
/// state where replaying the whole cycle is safe.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Sweep read failed for {shard_strategy} while {state}: {source}")]
    Read {
        shard_strategy: ShardAndStrategy,
        state: CycleState,
        #[source]
        source: StorageError,
    },

    #[error("Sweep consumer failed for {shard_strategy}: {source}")]
    Consumer {
        shard_strategy: ShardAndStrategy,
        #[source]
        source: StorageError,
    },

    #[error("Scrubbing sweep queue failed for {shard_strategy}: {source}")]
    Scrub {
        shard_strategy: ShardAndStrategy,
        #[source]
        source: StorageError,
    },

    #[error("Advancing sweep progress failed for {shard_strategy}: {source}")]
    Advance {
        shard_strategy: ShardAndStrategy,
        #[source]
        source: StorageError,
    },

    #[error("Sweep invariant violated for {shard_strategy}: {detail}")]
    InvariantViolation {
        shard_strategy: ShardAndStrategy,
        detail: String,
    },

    #[error("Shard {0} is already being swept by another worker")]
    LeaseUnavailable(ShardAndStrategy),

    #[error("Sweep worker for {shard_strategy} did not finish: {detail}")]
    Worker {
        shard_strategy: ShardAndStrategy,
        detail: String,
    },
}

impl SweepError {
    /// Whether the caller's outer loop may run the cycle again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SweepError::InvariantViolation { .. })
    }
}

/// Configuration and command-surface errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Sweep error: {0}")]
    SweepError(#[from] SweepError),

    #[error("{failed} of {total} shards failed to sweep:\n{report}")]
    ShardsFailed {
        failed: usize,
        total: usize,
        report: String,
    },
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
