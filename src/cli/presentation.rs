//! CLI presentation: turns results into text or JSON. No side effects.

use crate::error::SweepError;
use crate::kvs::CandidateCell;
use crate::strategy::SweepStrategy;
use crate::sweeper::ShardProgress;
use crate::types::{ShardAndStrategy, TableRef, Timestamp};
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::json;

pub fn format_status_text(progress: &[ShardProgress], tables: &[(TableRef, SweepStrategy)]) -> String {
    let mut shards = Table::new();
    shards
        .load_preset(UTF8_FULL)
        .set_header(vec!["Shard", "Strategy", "Last swept", "Pending writes"]);
    for entry in progress {
        shards.add_row(vec![
            entry.shard_strategy.shard.to_string(),
            entry.shard_strategy.strategy.to_string(),
            entry.last_swept_timestamp.to_string(),
            entry.pending_writes.to_string(),
        ]);
    }

    let mut registered = Table::new();
    registered
        .load_preset(UTF8_FULL)
        .set_header(vec!["Table", "Strategy"]);
    for (table, strategy) in tables {
        registered.add_row(vec![table.to_string(), strategy.to_string()]);
    }

    format!("{}\n\n{}", shards, registered)
}

pub fn format_status_json(progress: &[ShardProgress], tables: &[(TableRef, SweepStrategy)]) -> String {
    let tables: Vec<_> = tables
        .iter()
        .map(|(table, strategy)| json!({ "table": table, "strategy": strategy }))
        .collect();
    let value = json!({ "shards": progress, "tables": tables });
    serde_json::to_string_pretty(&value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

pub fn format_sweep_results(results: &[(ShardAndStrategy, Result<Timestamp, SweepError>)]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Shard", "Strategy", "Result"]);
    for (shard_strategy, result) in results {
        let outcome = match result {
            Ok(reached) => format!("swept through {}", reached),
            Err(err) => format!("failed: {}", err),
        };
        table.add_row(vec![
            shard_strategy.shard.to_string(),
            shard_strategy.strategy.to_string(),
            outcome,
        ]);
    }
    table.to_string()
}

pub fn format_candidates(candidates: &[CandidateCell]) -> String {
    if candidates.is_empty() {
        return "No candidate cells".to_string();
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Cell (row/column, hex)", "Versions", "Timestamps"]);
    for candidate in candidates {
        let timestamps: Vec<String> = candidate
            .sorted_timestamps
            .iter()
            .map(|ts| ts.to_string())
            .collect();
        table.add_row(vec![
            candidate.cell.to_string(),
            candidate.sorted_timestamps.len().to_string(),
            timestamps.join(", "),
        ]);
    }
    format!("{}\n{} candidate cells", table, candidates.len())
}
