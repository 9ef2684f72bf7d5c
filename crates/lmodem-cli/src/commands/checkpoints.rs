//! Checkpoints command implementation.

use std::process::ExitCode;

use anyhow::Result;

use lmodem_core::transfer::CheckpointStore;

use super::CheckpointsArgs;

/// Run the checkpoints command.
pub fn run(args: &CheckpointsArgs) -> Result<ExitCode> {
    let config = super::load_config();
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config.storage.checkpoint_dir());
    let store = CheckpointStore::new(dir);

    if args.clear {
        let removed = store.clear()?;
        println!("Removed {} checkpoint(s) from {}.", removed, store.dir().display());
        return Ok(ExitCode::SUCCESS);
    }

    let checkpoints = store.list()?;
    if checkpoints.is_empty() {
        println!("No checkpoints in {}.", store.dir().display());
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("  Checkpoints in {}", store.dir().display());
    println!("  {}", "─".repeat(60));
    for checkpoint in &checkpoints {
        let percent = if checkpoint.block_count == 0 {
            0.0
        } else {
            checkpoint.received as f64 / checkpoint.block_count as f64 * 100.0
        };
        println!(
            "  {:<32} {:>3}/{:<3} blocks ({:>5.1}%)  {}",
            checkpoint.file_name,
            checkpoint.received,
            checkpoint.block_count,
            percent,
            checkpoint.saved_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!("  Receive the same file again to resume.");
    println!();
    Ok(ExitCode::SUCCESS)
}
