//! Integration tests for sweepq CLI commands

use clap::Parser;
use sweepq::cli::{Cli, RunContext};
use sweepq::config::SweepConfig;
use sweepq::error::ApiError;
use tempfile::TempDir;

fn context(num_shards: u32) -> (RunContext, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = SweepConfig::default();
    config.storage.db_path = dir.path().join("db");
    config.queue.num_shards = num_shards;
    config.queue.coarse_partition_size = 100;
    (RunContext::new(&config).unwrap(), dir)
}

fn run(ctx: &RunContext, args: &[&str]) -> Result<String, ApiError> {
    let mut argv = vec!["sweepq"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    ctx.execute(&cli.command)
}

#[test]
fn put_then_drain_leaves_sentinel_and_latest() {
    let (ctx, _dir) = context(2);
    run(&ctx, &["register", "ns.t", "conservative"]).unwrap();
    for ts in ["10", "20", "30"] {
        let out = run(&ctx, &["put", "ns.t", "r", "c", "v", "--timestamp", ts]).unwrap();
        assert!(!out.contains("not queued"));
    }

    let out = run(&ctx, &["sweep", "--max-ts", "40", "--drain"]).unwrap();
    assert!(out.contains("swept through 39"));

    let out = run(&ctx, &["cells", "ns.t", "--include-sentinels"]).unwrap();
    assert!(out.contains("0, 30"));
    assert!(out.ends_with("1 candidate cells"));
}

#[test]
fn put_to_unregistered_table_is_not_queued() {
    let (ctx, _dir) = context(1);

    let out = run(&ctx, &["put", "ns.free", "r", "c", "v", "--timestamp", "5"]).unwrap();

    assert!(out.contains("not queued"));
}

#[test]
fn single_shard_sweep_reports_progress() {
    let (ctx, _dir) = context(1);
    run(&ctx, &["register", "ns.t", "thorough"]).unwrap();
    run(&ctx, &["put", "ns.t", "r", "c", "v", "--timestamp", "150"]).unwrap();

    let out = run(
        &ctx,
        &["sweep", "--max-ts", "300", "--shard", "0", "--strategy", "thorough"],
    )
    .unwrap();
    assert_eq!(out, "Shard 0/thorough swept through 199");

    let out = run(&ctx, &["status", "--json"]).unwrap();
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    let shards = status["shards"].as_array().unwrap();
    assert!(shards
        .iter()
        .any(|s| s["last_swept_timestamp"] == 199 && s["pending_writes"] == 0));
    assert_eq!(status["tables"][0]["table"], "ns.t");
}

#[test]
fn out_of_range_shard_is_rejected() {
    let (ctx, _dir) = context(2);

    let err = run(
        &ctx,
        &["sweep", "--max-ts", "10", "--shard", "7", "--strategy", "conservative"],
    )
    .unwrap_err();

    assert!(matches!(err, ApiError::InvalidArgument(_)));
}

#[test]
fn unknown_strategy_is_rejected() {
    let (ctx, _dir) = context(1);

    let err = run(&ctx, &["register", "ns.t", "aggressive"]).unwrap_err();

    assert!(matches!(err, ApiError::InvalidArgument(_)));
}

#[test]
fn cells_of_unknown_table_fail() {
    let (ctx, _dir) = context(1);

    assert!(run(&ctx, &["cells", "ns.missing"]).is_err());
}

#[test]
fn sweep_with_a_failing_shard_is_an_error() {
    let dir = TempDir::new().unwrap();
    {
        // Shard 0/conservative gets a progress value that cannot be decoded.
        let db = sled::open(dir.path().join("db")).unwrap();
        let progress = db.open_tree("sweep_progress").unwrap();
        progress.insert([0u8, 0, 0, 0, 0], vec![1u8, 2, 3]).unwrap();
        db.flush().unwrap();
    }
    let mut config = SweepConfig::default();
    config.storage.db_path = dir.path().join("db");
    config.queue.num_shards = 2;
    config.queue.coarse_partition_size = 100;
    let ctx = RunContext::new(&config).unwrap();

    let err = run(&ctx, &["sweep", "--max-ts", "10"]).unwrap_err();

    match err {
        ApiError::ShardsFailed {
            failed,
            total,
            report,
        } => {
            assert_eq!((failed, total), (1, 4));
            assert!(report.contains("failed:"));
            assert!(report.contains("swept through 9"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
