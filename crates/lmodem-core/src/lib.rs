//! # LMODEM Core Library
//!
//! `lmodem-core` provides the core functionality for LMODEM, a resumable
//! file transfer protocol for half-duplex LoRa radio modems driven over a
//! serial port.
//!
//! ## Features
//!
//! - **Fixed-width blocks**: Files are compressed, radix-85 and hex encoded,
//!   then cut into blocks sized for one radio frame
//! - **Selective repeat**: The receiver asks only for the blocks it is missing
//! - **Resumable**: Partial receives survive restarts as checkpoint files
//! - **Verified**: Every file is fingerprinted and checked after reassembly
//!
//! ## Modules
//!
//! - [`block`] - Block indices and payloads
//! - [`codec`] - File encoding pipeline
//! - [`config`] - Configuration management
//! - [`mod@file`] - File names, fingerprints and manifests
//! - [`profile`] - Mode and channel tables
//! - [`protocol`] - Packet framing and control tokens
//! - [`session`] - Sender and receiver state machines
//! - [`transfer`] - Receive ledger and checkpoints
//! - [`transport`] - Radio transport seam and drivers
//!
//! ## Example
//!
//! ```rust,ignore
//! use lmodem_core::profile::{resolve_channel, resolve_mode};
//! use lmodem_core::session::{PreparedFile, SendSession};
//! use lmodem_core::transport::{configure, LoStik, LoStikConfig};
//!
//! let mode = resolve_mode(1)?;
//! let channel = resolve_channel(2)?;
//! let mut radio = LoStik::open(&LoStikConfig::default())?;
//! configure(&mut radio, &mode, &channel)?;
//!
//! let file = PreparedFile::load("report.pdf".as_ref(), &mode)?;
//! let outcome = SendSession::new(radio, mode, file).run()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod profile;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Outcome, ReceiveSession, SendSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
