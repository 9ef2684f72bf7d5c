//! Config command implementation.

use std::process::ExitCode;

use anyhow::Result;

use lmodem_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: &ConfigArgs) -> Result<ExitCode> {
    match args.action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!();
            println!("LMODEM Configuration");
            println!("{}", "─".repeat(50));
            println!();
            print!("{}", config.to_toml()?);
            println!();
        }

        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }

        ConfigAction::Init { force } => {
            let path = Config::config_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            Config::default().save()?;
            println!("Wrote default configuration to {}.", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
