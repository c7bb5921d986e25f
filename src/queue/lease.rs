//! Per-shard ownership.
//!
//! Reading progress and advancing it are separate steps, so two workers on the
//! same shard+strategy could skip or repeat ranges. A reader can only be built
//! from a [`ShardLease`], and at most one lease per shard+strategy exists at a
//! time within a [`ShardLeaseManager`].

use crate::types::ShardAndStrategy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct ShardLeaseManager {
    held: Mutex<HashSet<ShardAndStrategy>>,
}

impl ShardLeaseManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes ownership of a shard, or returns `None` if another worker holds it.
    pub fn try_acquire(self: &Arc<Self>, shard_strategy: ShardAndStrategy) -> Option<ShardLease> {
        let mut held = self.held.lock();
        if !held.insert(shard_strategy) {
            debug!(%shard_strategy, "Shard lease already held");
            return None;
        }
        debug!(%shard_strategy, "Acquired shard lease");
        Some(ShardLease {
            shard_strategy,
            manager: Arc::clone(self),
        })
    }

    pub fn is_held(&self, shard_strategy: ShardAndStrategy) -> bool {
        self.held.lock().contains(&shard_strategy)
    }

    fn release(&self, shard_strategy: ShardAndStrategy) {
        self.held.lock().remove(&shard_strategy);
        debug!(%shard_strategy, "Released shard lease");
    }
}

/// Exclusive right to sweep one shard+strategy. Released on drop.
pub struct ShardLease {
    shard_strategy: ShardAndStrategy,
    manager: Arc<ShardLeaseManager>,
}

impl ShardLease {
    pub fn shard_strategy(&self) -> ShardAndStrategy {
        self.shard_strategy
    }
}

impl Drop for ShardLease {
    fn drop(&mut self) {
        self.manager.release(self.shard_strategy);
    }
}

impl std::fmt::Debug for ShardLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardLease")
            .field("shard_strategy", &self.shard_strategy)
            .finish()
    }
}
