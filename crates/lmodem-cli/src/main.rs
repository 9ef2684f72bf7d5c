//! LMODEM CLI - Resumable file transfer over LoRa radio modems
//!
//! Two stations, each with a LoStik on a serial port, agree on a mode and a
//! channel. One sends, the other receives.
//!
//! ## Quick Start
//!
//! ```bash
//! # On the receiving station
//! lmodem receive -o ./inbox
//!
//! # On the sending station
//! lmodem send ./report.pdf
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | File transferred or already present |
//! | 1 | Failure, including a transfer left incomplete |
//! | 2 | Interrupted by the operator |

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use std::process::ExitCode;

use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Send(args) => commands::send::run(args, cli.quiet).await,
        Command::Receive(args) => commands::receive::run(args, cli.quiet).await,
        Command::Modes => commands::modes::run(),
        Command::Checkpoints(args) => commands::checkpoints::run(&args),
        Command::Config(args) => commands::config::run(&args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("  Error: {:#}", e);
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,lmodem=debug,lmodem_core=debug"
    } else if quiet {
        "error"
    } else {
        "warn,lmodem=info,lmodem_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
