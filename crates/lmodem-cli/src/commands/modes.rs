//! Modes command implementation.

use std::process::ExitCode;

use anyhow::Result;

use lmodem_core::file::format_size;
use lmodem_core::profile::{channels, modes, DEFAULT_CHANNEL, DEFAULT_MODE};

/// Run the modes command.
pub fn run() -> Result<ExitCode> {
    println!();
    println!("  Modes");
    println!("  {}", "─".repeat(72));
    println!(
        "  {:<5} {:>6} {:>9} {:>4} {:>4} {:>9} {:>6} {:>9}",
        "Mode", "Power", "Bandwidth", "SF", "CR", "Watchdog", "Block", "Max file"
    );
    for mode in modes() {
        let marker = if mode.id == DEFAULT_MODE { "*" } else { " " };
        println!(
            "  {:<5} {:>6} {:>9} {:>4} {:>4} {:>9} {:>6} {:>9}",
            format!("{}{}", mode.id, marker),
            format!("{} dBm", mode.params.power),
            format!("{} kHz", mode.params.bandwidth_khz),
            mode.params.spreading_factor,
            mode.params.coding_rate.to_string(),
            format!("{} ms", mode.params.watchdog_ms),
            mode.block_width,
            format_size(mode.max_ota_size as u64),
        );
    }

    println!();
    println!("  Channels");
    println!("  {}", "─".repeat(72));
    for channel in channels() {
        let marker = if channel.id == DEFAULT_CHANNEL { "*" } else { " " };
        println!(
            "  {:<5} {:.1} MHz",
            format!("{}{}", channel.id, marker),
            channel.megahertz()
        );
    }

    println!();
    println!("  * default. Both stations must use the same mode and channel.");
    println!("  Max file is the encoded size; compressible files can be larger on disk.");
    println!();
    Ok(ExitCode::SUCCESS)
}
