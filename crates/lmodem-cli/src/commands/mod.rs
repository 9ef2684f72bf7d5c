//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use lmodem_core::config::Config;
use lmodem_core::profile::{resolve_channel, resolve_mode, Channel, Profile};
use lmodem_core::session::{CancelToken, Outcome};
use lmodem_core::transport::lostik::parse_usb_id;
use lmodem_core::transport::{configure, LoStik, LoStikConfig};

pub mod checkpoints;
pub mod config;
pub mod modes;
pub mod receive;
pub mod send;

/// Exit code for a session stopped with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 2;

/// Load configuration with graceful fallback to defaults.
///
/// A file that exists but cannot be parsed is reported and ignored.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring configuration file");
        Config::default()
    })
}

/// LMODEM - Resumable file transfer over LoRa radio modems
#[derive(Parser)]
#[command(name = "lmodem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Detailed logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send a file to a receiving station
    Send(SendArgs),

    /// Receive a file from a sending station
    Receive(ReceiveArgs),

    /// List modes and channels
    Modes,

    /// List or clear saved checkpoints
    Checkpoints(CheckpointsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Radio selection shared by send and receive
#[derive(Args, Debug, Clone)]
pub struct RadioArgs {
    /// Mode number (see `lmodem modes`)
    #[arg(short, long)]
    pub mode: Option<u8>,

    /// Channel number (see `lmodem modes`)
    #[arg(short, long)]
    pub channel: Option<u8>,

    /// Serial port of the radio (auto-detected when omitted)
    #[arg(short, long, env = "LMODEM_PORT")]
    pub port: Option<String>,
}

/// Arguments for the send command
#[derive(Args, Debug)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    #[command(flatten)]
    pub radio: RadioArgs,
}

/// Arguments for the receive command
#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Output directory for the received file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for checkpoints (defaults to the output directory)
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    #[command(flatten)]
    pub radio: RadioArgs,
}

/// Arguments for the checkpoints command
#[derive(Args, Debug)]
pub struct CheckpointsArgs {
    /// Checkpoint directory (defaults to the configured one)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Delete every checkpoint in the directory
    #[arg(long)]
    pub clear: bool,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Mode and channel selected for a session, CLI flags over the config file.
pub fn select_profile(args: &RadioArgs, config: &Config) -> Result<(Profile, Channel)> {
    let mode = resolve_mode(args.mode.unwrap_or(config.session.mode))?;
    let channel = resolve_channel(args.channel.unwrap_or(config.session.channel))?;
    Ok((mode, channel))
}

/// How to reach the radio, CLI flags over the config file.
pub fn radio_config(args: &RadioArgs, config: &Config) -> Result<LoStikConfig> {
    let port = args
        .port
        .clone()
        .or_else(|| config.radio.explicit_port().map(str::to_string));
    let usb_id = parse_usb_id(&config.radio.usb_id).context("Invalid usb_id in configuration")?;
    Ok(LoStikConfig {
        port,
        baud_rate: config.radio.baud_rate,
        usb_id,
    })
}

/// Open the radio and apply the session's mode and channel.
///
/// Blocks on serial I/O.
pub fn open_radio(
    radio: &LoStikConfig,
    profile: &Profile,
    channel: &Channel,
) -> lmodem_core::Result<LoStik> {
    let mut stik = LoStik::open(radio)?;
    configure(&mut stik, profile, channel)?;
    Ok(stik)
}

/// Run a blocking session, cancelling it on Ctrl-C.
///
/// The session sees the cancellation at its next step, saves whatever it
/// must and returns, so the join always completes.
pub async fn run_session<F>(cancel: CancelToken, quiet: bool, job: F) -> Result<lmodem_core::Result<Outcome>>
where
    F: FnOnce() -> lmodem_core::Result<Outcome> + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(job);

    tokio::select! {
        joined = &mut handle => Ok(joined?),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            if !quiet {
                eprintln!();
                eprintln!("  Interrupted, stopping after the current step...");
            }
            cancel.cancel();
            Ok(handle.await?)
        }
    }
}

/// Map a finished session to the process exit code.
pub fn exit_code(result: &lmodem_core::Result<Outcome>) -> ExitCode {
    match result {
        Ok(outcome) if outcome.is_success() => ExitCode::SUCCESS,
        Err(lmodem_core::Error::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Ok(_) | Err(_) => ExitCode::FAILURE,
    }
}
