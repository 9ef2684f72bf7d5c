//! Receive command implementation.

use std::process::ExitCode;

use anyhow::{Context, Result};

use lmodem_core::session::{CancelToken, ReceiveSession};

use super::ReceiveArgs;
use crate::ui::{self, ProgressPrinter};

/// Run the receive command.
pub async fn run(args: ReceiveArgs, quiet: bool) -> Result<ExitCode> {
    let config = super::load_config();
    let (profile, channel) = super::select_profile(&args.radio, &config)?;
    let radio = super::radio_config(&args.radio, &config)?;
    let session_config = config.session.session_config();

    let output_dir = args.output.unwrap_or_else(|| config.storage.output_dir());
    let checkpoint_dir = args.checkpoint_dir.unwrap_or_else(|| {
        config
            .storage
            .checkpoint_dir
            .clone()
            .unwrap_or_else(|| output_dir.clone())
    });
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    if !quiet {
        println!();
        println!("LMODEM v{}", lmodem_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!(
            "  Mode {} on channel {} ({:.1} MHz)",
            profile.id,
            channel.id,
            channel.megahertz()
        );
        println!("  Saving to {}", output_dir.display());
        println!();
        println!("  Calling sending station...");
    }

    let cancel = CancelToken::new();
    let token = cancel.clone();
    let result = super::run_session(cancel, quiet, move || {
        let stik = super::open_radio(&radio, &profile, &channel)?;
        let mut session = ReceiveSession::new(stik, profile, output_dir)
            .with_checkpoint_dir(checkpoint_dir)
            .with_config(session_config)
            .with_cancel(token);
        if !quiet {
            let mut printer = ProgressPrinter::receiving();
            session = session.on_progress(move |p| printer.update(p));
        }
        session.run()
    })
    .await?;

    if !quiet {
        ui::print_result(&result);
    }
    Ok(super::exit_code(&result))
}
