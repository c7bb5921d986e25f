//! Sweepq: background sweeping for a multi-version key-value store.
//!
//! Committed writes are queued per shard and strategy; a sweeper consumes the
//! queue in timestamp order and deletes the versions those writes made stale.

pub mod cli;
pub mod config;
pub mod deleter;
pub mod error;
pub mod kvs;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod strategy;
pub mod sweeper;
pub mod types;

pub use deleter::SweepDeleter;
pub use error::{ApiError, StorageError, SweepError};
pub use kvs::{KeyValueService, SledKeyValueService};
pub use queue::{SweepQueueReader, SweepQueueTables};
pub use strategy::SweepStrategy;
pub use sweeper::TargetedSweeper;
pub use types::{Cell, ShardAndStrategy, SweepBatch, TableRef, Timestamp, WriteInfo};
