//! Radio transport seam.
//!
//! The protocol core only ever talks to a [`Transport`]: something that can
//! take a physical profile, hand back what it actually applied, send one
//! frame and wait a bounded time for one frame.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryTransport`] - a linked pair over in-process channels
//! - [`LoStik`] - the Ronoth LoStik (RN2903) over a serial port, behind the
//!   `serial` feature

pub mod memory;

#[cfg(feature = "serial")]
pub mod lostik;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::{Channel, Profile, RadioParams};

pub use memory::MemoryTransport;

#[cfg(feature = "serial")]
pub use lostik::{LoStik, LoStikConfig};

/// Failures reported by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No device matched the expected USB id
    #[error("no radio found with USB id {0}")]
    NotFound(String),

    /// More than one device matched and none was chosen explicitly
    #[error("{count} radios found with USB id {usb_id}, choose one with --port")]
    Ambiguous {
        /// Matching devices
        count: usize,
        /// USB id searched for
        usb_id: String,
    },

    /// The serial port could not be opened
    #[error("failed to open {port}: {reason}")]
    Open {
        /// Port name
        port: String,
        /// Driver message
        reason: String,
    },

    /// Device firmware is not one we can drive
    #[error("unsupported firmware '{0}'")]
    UnsupportedFirmware(String),

    /// The device answered a command with something unexpected
    #[error("command '{command}' failed: {reply}")]
    Command {
        /// Command sent
        command: String,
        /// Reply received
        reply: String,
    },

    /// The device is busy with another operation
    #[error("radio busy")]
    Busy,

    /// The radio reported a transmit failure
    #[error("transmit failed: {0}")]
    TransmitFailed(String),

    /// The device stopped answering
    #[error("no reply from radio within {0:?}")]
    Unresponsive(Duration),

    /// Parameters were read before any profile was applied
    #[error("radio has not been configured")]
    NotConfigured,

    /// The peer end is gone
    #[error("link disconnected")]
    Disconnected,

    /// I/O error on the underlying device
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters read back from the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedParams {
    /// Physical parameters
    pub radio: RadioParams,
    /// Center frequency in Hz
    pub frequency: u32,
}

/// Timing of one completed transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission {
    /// When the radio reported the frame sent
    pub sent_at: DateTime<Utc>,
    /// Time between the radio accepting the frame and finishing it
    pub air_time: Duration,
}

/// Result of one receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A frame arrived
    Frame(Vec<u8>),
    /// Nothing arrived before the watchdog expired
    Timeout,
}

/// Signal quality of the last received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkQuality {
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Signal-to-noise ratio in dB
    pub snr: i16,
}

/// A half-duplex radio link.
pub trait Transport {
    /// Apply a mode and channel to the radio.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio rejects a parameter.
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError>;

    /// Read the parameters the radio is actually using.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be queried.
    fn applied_params(&mut self) -> Result<AppliedParams, TransportError>;

    /// Send one frame of ASCII hex text.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame was not sent.
    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError>;

    /// Wait up to `timeout` for one frame.
    ///
    /// # Errors
    ///
    /// Returns an error on device failure. An expired wait is
    /// [`Received::Timeout`], not an error.
    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError>;

    /// Signal quality of the last received frame, if the radio reports it.
    fn link_quality(&mut self) -> Option<LinkQuality> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        (**self).apply_profile(profile, channel)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        (**self).applied_params()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        (**self).transmit(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        (**self).receive(timeout)
    }

    fn link_quality(&mut self) -> Option<LinkQuality> {
        (**self).link_quality()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        (**self).apply_profile(profile, channel)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        (**self).applied_params()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        (**self).transmit(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        (**self).receive(timeout)
    }

    fn link_quality(&mut self) -> Option<LinkQuality> {
        (**self).link_quality()
    }
}

/// Apply a mode and channel, then read them back and check the radio took
/// every value as given.
///
/// # Errors
///
/// Returns [`crate::Error::RadioMisconfigured`] if the read-back differs, or a
/// transport error if the radio cannot be driven.
pub fn configure<T: Transport + ?Sized>(
    transport: &mut T,
    profile: &Profile,
    channel: &Channel,
) -> crate::Result<AppliedParams> {
    transport.apply_profile(profile, channel)?;
    let applied = transport.applied_params()?;

    if !profile.matches(&applied.radio) {
        return Err(crate::Error::RadioMisconfigured(format!(
            "mode {} expects {:?}, radio reports {:?}",
            profile.id, profile.params, applied.radio
        )));
    }
    if !channel.verify_applied(applied.frequency) {
        return Err(crate::Error::RadioMisconfigured(format!(
            "channel {} expects {} Hz, radio reports {} Hz",
            channel.id, channel.frequency, applied.frequency
        )));
    }

    tracing::info!(
        mode = profile.id,
        channel = channel.id,
        frequency = applied.frequency,
        "Radio configured"
    );
    Ok(applied)
}
