//! UI utilities for LMODEM CLI.

use std::time::Duration;

use lmodem_core::file::{format_size, FileManifest};
use lmodem_core::profile::{Channel, Profile};
use lmodem_core::session::{Outcome, SessionState, TransferProgress};

const BOX_WIDTH: usize = 41;

/// A formatted box describing the file about to go on the air.
pub struct DetailsBox {
    lines: Vec<String>,
}

impl DetailsBox {
    /// Create a box from a manifest.
    #[must_use]
    pub fn for_manifest(manifest: &FileManifest) -> Self {
        Self {
            lines: vec![
                manifest.name.clone(),
                String::new(),
                format!("Size on disk   {}", format_size(manifest.size_on_disk)),
                format!("Over the air   {}", format_size(manifest.size_ota)),
                format!("Blocks         {}", manifest.block_count),
            ],
        }
    }

    /// Add the mode and channel to the box.
    #[must_use]
    pub fn with_link(mut self, profile: &Profile, channel: &Channel) -> Self {
        self.lines.push(format!("Mode           {}", profile.id));
        self.lines.push(format!(
            "Channel        {} ({:.1} MHz)",
            channel.id,
            channel.megahertz()
        ));
        self
    }

    /// Display the box to stdout.
    pub fn display(&self) {
        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        for line in &self.lines {
            println!("  │{}│", pad_in_box(line, BOX_WIDTH));
        }
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn pad_in_box(content: &str, width: usize) -> String {
    let content: String = content.chars().take(width.saturating_sub(4)).collect();
    let padding = width.saturating_sub(content.chars().count() + 2);
    format!("  {}{}", content, " ".repeat(padding))
}

/// Prints session progress as it happens.
pub struct ProgressPrinter {
    receiving: bool,
    last_state: SessionState,
    last_done: usize,
}

impl ProgressPrinter {
    /// Printer for the sending side.
    #[must_use]
    pub const fn sending() -> Self {
        Self::new(false)
    }

    /// Printer for the receiving side.
    #[must_use]
    pub const fn receiving() -> Self {
        Self::new(true)
    }

    const fn new(receiving: bool) -> Self {
        Self {
            receiving,
            last_state: SessionState::Idle,
            last_done: 0,
        }
    }

    /// Handle one progress snapshot.
    pub fn update(&mut self, progress: &TransferProgress) {
        if progress.state != self.last_state {
            self.last_state = progress.state;
            self.print_state(progress);
        }

        if progress.state == SessionState::DeliveringBlocks && progress.blocks_done != self.last_done {
            self.last_done = progress.blocks_done;
            println!(
                "  Block {:>3}/{:<3} {:>5.1}%  {}",
                progress.blocks_done,
                progress.blocks_total,
                progress.percentage(),
                format_elapsed(progress.started_at.elapsed())
            );
        }
    }

    fn print_state(&self, progress: &TransferProgress) {
        match progress.state {
            SessionState::ExchangingManifest => println!("  Connected."),
            SessionState::RequestingBlocks if self.receiving => {
                if let (Some(name), Some(size)) = (&progress.file_name, progress.file_size) {
                    println!(
                        "  Receiving {} ({}, {} blocks)",
                        name,
                        format_size(size),
                        progress.blocks_total
                    );
                }
                if progress.blocks_done > 0 {
                    println!(
                        "  Resuming with {} of {} blocks already here",
                        progress.blocks_done, progress.blocks_total
                    );
                }
            }
            SessionState::DeliveringBlocks => {
                if self.receiving {
                    println!("  Collecting blocks...");
                } else {
                    println!("  Sending blocks...");
                }
            }
            SessionState::Verifying => {
                if self.receiving {
                    println!("  Verifying...");
                } else {
                    println!("  Waiting for the receiver to verify...");
                }
            }
            SessionState::Complete | SessionState::Incomplete | SessionState::Aborted => {
                println!(
                    "  Air time {:.1}s, elapsed {}",
                    progress.air_time.as_secs_f64(),
                    format_elapsed(progress.started_at.elapsed())
                );
            }
            _ => {}
        }
    }
}

/// Print the terminal status line for a finished session.
pub fn print_result(result: &lmodem_core::Result<Outcome>) {
    println!();
    match result {
        Ok(Outcome::Completed) => println!("  Transfer complete! File verified."),
        Ok(Outcome::DuplicateVerified) => {
            println!("  Receiver already has this file. Nothing to send.");
        }
        Ok(Outcome::Incomplete) => {
            println!("  Transfer incomplete. Run the same command again to resume.");
        }
        Err(e) => {
            match e.code() {
                Some(code) => eprintln!("  Transfer failed [{}]: {}", code, e),
                None => eprintln!("  Transfer failed: {}", e),
            }
            if let Some(suggestion) = e.suggestion() {
                eprintln!();
                for line in suggestion.lines() {
                    eprintln!("  {}", line.trim());
                }
            }
        }
    }
    println!();
}

/// Format elapsed time as "M:SS".
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{}:{:02}", mins, secs)
}
