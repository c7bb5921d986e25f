//! Table strategy registry
//!
//! Persistent `table -> strategy` map. A table's strategy is fixed the first
//! time it is registered; the queue depends on it never changing, since writes
//! already queued under one strategy are only ever read back under that one.

use crate::error::StorageError;
use crate::strategy::SweepStrategy;
use crate::types::TableRef;
use tracing::info;

const TREE_TABLE_STRATEGIES: &str = "sweep_table_strategies";

pub struct TableStrategyRegistry {
    tree: sled::Tree,
}

impl TableStrategyRegistry {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        let tree = db
            .open_tree(TREE_TABLE_STRATEGIES)
            .map_err(|e| StorageError::from_sled("Failed to open table strategies", e))?;
        Ok(Self { tree })
    }

    /// Registers `table` for sweeping. Registering again with the same strategy
    /// is a no-op; a different strategy is rejected.
    pub fn register(&self, table: &TableRef, strategy: SweepStrategy) -> Result<(), StorageError> {
        let key = table.as_str().as_bytes();
        let swapped = self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(&[strategy.as_byte()][..]))
            .map_err(|e| StorageError::from_sled("Failed to register table strategy", e))?;

        match swapped {
            Ok(()) => {
                info!(%table, %strategy, "Registered table for sweep");
                Ok(())
            }
            Err(conflict) => {
                let existing = conflict
                    .current
                    .as_deref()
                    .and_then(decode_strategy)
                    .ok_or_else(|| StorageError::CorruptKey {
                        tree: TREE_TABLE_STRATEGIES,
                        detail: format!("unreadable strategy for {}", table),
                    })?;
                if existing == strategy {
                    Ok(())
                } else {
                    Err(StorageError::StrategyConflict {
                        table: table.clone(),
                        existing,
                        requested: strategy,
                    })
                }
            }
        }
    }

    pub fn strategy_for(&self, table: &TableRef) -> Result<Option<SweepStrategy>, StorageError> {
        let raw = self
            .tree
            .get(table.as_str().as_bytes())
            .map_err(|e| StorageError::from_sled("Failed to read table strategy", e))?;
        Ok(raw.as_deref().and_then(decode_strategy))
    }

    pub fn list(&self) -> Result<Vec<(TableRef, SweepStrategy)>, StorageError> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) =
                entry.map_err(|e| StorageError::from_sled("Failed to scan table strategies", e))?;
            let table = TableRef::new(String::from_utf8_lossy(&key).into_owned());
            if let Some(strategy) = decode_strategy(&value) {
                out.push((table, strategy));
            }
        }
        Ok(out)
    }
}

fn decode_strategy(raw: &[u8]) -> Option<SweepStrategy> {
    match raw {
        [byte] => SweepStrategy::from_byte(*byte),
        _ => None,
    }
}
