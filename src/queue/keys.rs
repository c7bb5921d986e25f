//! Key layout of the sweep queue trees.
//!
//! All integers are big-endian so that sled's lexicographic ordering follows
//! shard, then strategy, then timestamp order.
//!
//! - timestamps tree: `shard(4) | strategy(1) | partition(8)`
//! - cells tree: `shard(4) | strategy(1) | start_ts(8) | cell_digest(32)`
//! - progress tree: `shard(4) | strategy(1)`

use crate::error::StorageError;
use crate::strategy::SweepStrategy;
use crate::types::{ShardAndStrategy, Timestamp};
use serde::{Deserialize, Serialize};

pub(crate) const PREFIX_LEN: usize = 5;
pub(crate) const TIMESTAMP_KEY_LEN: usize = PREFIX_LEN + 8;
pub(crate) const CELL_KEY_LEN: usize = PREFIX_LEN + 8 + 32;

/// Fixed-size timestamp buckets used by the coarse index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPartitioning {
    size: u64,
}

impl TimestampPartitioning {
    pub fn new(size: u64) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn partition_of(&self, timestamp: Timestamp) -> u64 {
        timestamp / self.size
    }

    pub fn first_timestamp(&self, partition: u64) -> Timestamp {
        partition.saturating_mul(self.size)
    }

    pub fn last_timestamp(&self, partition: u64) -> Timestamp {
        partition
            .saturating_add(1)
            .saturating_mul(self.size)
            .saturating_sub(1)
    }
}

pub(crate) fn shard_prefix(shard_strategy: ShardAndStrategy) -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[..4].copy_from_slice(&shard_strategy.shard.to_be_bytes());
    prefix[4] = shard_strategy.strategy.as_byte();
    prefix
}

pub(crate) fn decode_shard_prefix(
    tree: &'static str,
    key: &[u8],
) -> Result<ShardAndStrategy, StorageError> {
    if key.len() < PREFIX_LEN {
        return Err(StorageError::CorruptKey {
            tree,
            detail: format!("key too short ({} bytes)", key.len()),
        });
    }
    let mut shard = [0u8; 4];
    shard.copy_from_slice(&key[..4]);
    let strategy = SweepStrategy::from_byte(key[4]).ok_or_else(|| StorageError::CorruptKey {
        tree,
        detail: format!("unknown strategy byte {}", key[4]),
    })?;
    Ok(ShardAndStrategy::new(u32::from_be_bytes(shard), strategy))
}

pub(crate) fn timestamp_key(shard_strategy: ShardAndStrategy, partition: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(TIMESTAMP_KEY_LEN);
    key.extend_from_slice(&shard_prefix(shard_strategy));
    key.extend_from_slice(&partition.to_be_bytes());
    key
}

pub(crate) fn decode_timestamp_key(key: &[u8]) -> Result<u64, StorageError> {
    if key.len() != TIMESTAMP_KEY_LEN {
        return Err(StorageError::CorruptKey {
            tree: super::timestamps::TREE_SWEEPABLE_TIMESTAMPS,
            detail: format!("expected {} bytes, got {}", TIMESTAMP_KEY_LEN, key.len()),
        });
    }
    Ok(read_u64(&key[PREFIX_LEN..]))
}

pub(crate) fn cell_key(
    shard_strategy: ShardAndStrategy,
    start_timestamp: Timestamp,
    digest: &[u8; 32],
) -> Vec<u8> {
    let mut key = Vec::with_capacity(CELL_KEY_LEN);
    key.extend_from_slice(&shard_prefix(shard_strategy));
    key.extend_from_slice(&start_timestamp.to_be_bytes());
    key.extend_from_slice(digest);
    key
}

/// First and last possible cell keys for writes in `[from, to]`.
pub(crate) fn cell_key_range(
    shard_strategy: ShardAndStrategy,
    from: Timestamp,
    to: Timestamp,
) -> (Vec<u8>, Vec<u8>) {
    (
        cell_key(shard_strategy, from, &[0u8; 32]),
        cell_key(shard_strategy, to, &[0xffu8; 32]),
    )
}

pub(crate) fn progress_key(shard_strategy: ShardAndStrategy) -> Vec<u8> {
    shard_prefix(shard_strategy).to_vec()
}

pub(crate) fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
