//! Send command implementation.

use std::process::ExitCode;

use anyhow::Result;

use lmodem_core::session::{CancelToken, PreparedFile, SendSession};

use super::SendArgs;
use crate::ui::{self, DetailsBox, ProgressPrinter};

/// Run the send command.
pub async fn run(args: SendArgs, quiet: bool) -> Result<ExitCode> {
    let config = super::load_config();
    let (profile, channel) = super::select_profile(&args.radio, &config)?;
    let radio = super::radio_config(&args.radio, &config)?;
    let session_config = config.session.session_config();

    // Everything that can be refused locally is refused before the radio opens.
    let file = PreparedFile::load(&args.file, &profile)?;

    if !quiet {
        println!();
        println!("LMODEM v{}", lmodem_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        DetailsBox::for_manifest(&file.manifest)
            .with_link(&profile, &channel)
            .display();
        println!();
        println!("  Waiting for receiving station...");
    }

    let cancel = CancelToken::new();
    let token = cancel.clone();
    let result = super::run_session(cancel, quiet, move || {
        let stik = super::open_radio(&radio, &profile, &channel)?;
        let mut session = SendSession::new(stik, profile, file)
            .with_config(session_config)
            .with_cancel(token);
        if !quiet {
            let mut printer = ProgressPrinter::sending();
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
