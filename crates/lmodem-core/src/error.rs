//! Error types for LMODEM.
//!
//! This module provides a unified error type for all LMODEM operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

use crate::transport::TransportError;

/// A specialized `Result` type for LMODEM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for LMODEM.
#[derive(Error, Debug)]
pub enum Error {
    /// Mode or channel id outside the profile table (L001)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// File name exceeds the protocol limit (L002)
    #[error("file name '{name}' exceeds {limit} character limit")]
    FileNameTooLong {
        /// The offending file name
        name: String,
        /// Maximum allowed length
        limit: usize,
    },

    /// File name cannot be carried by the manifest
    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    /// Encoded file is too large for the selected mode (L003)
    #[error("size over the air ({size} bytes) exceeds maximum of {max} bytes for mode {mode}")]
    OtaSizeExceeded {
        /// Over-the-air size of the encoded file
        size: usize,
        /// Maximum for the mode
        max: usize,
        /// Mode id
        mode: u8,
    },

    /// Encoded file needs more blocks than the index can address (L004)
    #[error("file needs {count} blocks, protocol limit is {limit}")]
    TooManyBlocks {
        /// Blocks required
        count: usize,
        /// Highest allowed block count
        limit: usize,
    },

    /// Radio read-back does not match the requested profile (L005)
    #[error("radio misconfigured: {0}")]
    RadioMisconfigured(String),

    /// Transport failure (L006)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Watchdog expired while waiting for the peer (L007)
    #[error("watchdog time-out while {0}")]
    Timeout(&'static str),

    /// Hex or radix-85 decoding rejected the received text (L008)
    #[error("alphabet error: {0}")]
    Alphabet(String),

    /// Decompression failed (L009)
    #[error("codec error: {0}")]
    Codec(String),

    /// Reconstructed file does not match the manifest fingerprint (L010)
    #[error("integrity check failed for '{file}': expected {expected}, got {actual}")]
    Integrity {
        /// File name
        file: String,
        /// Fingerprint from the manifest
        expected: String,
        /// Fingerprint of the written file
        actual: String,
    },

    /// Checkpoint belongs to a different transfer
    #[error("checkpoint fingerprint mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        /// Fingerprint of the current transfer
        expected: String,
        /// Fingerprint stored in the checkpoint
        found: String,
    },

    /// Packet could not be parsed
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Peer replied with something other than what this state accepts
    #[error("unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        /// Expected reply
        expected: &'static str,
        /// Reply received
        actual: String,
    },

    /// Receiver holds a different file under the same name (L011)
    #[error("duplicate file name '{0}' found, integrity check failed")]
    DuplicateConflict(String),

    /// Receiver reported a fingerprint mismatch after reconstruction
    #[error("remote station reported integrity check failure")]
    RemoteIntegrityFailure,

    /// Receiver could not decode the collected blocks, or refused the file details
    #[error("remote station reported decode failure")]
    RemoteDecodeFailure,

    /// Session was cancelled by the operator
    #[error("transfer interrupted")]
    Interrupted,

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern LXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration(_) => Some("L001"),
            Self::FileNameTooLong { .. } => Some("L002"),
            Self::OtaSizeExceeded { .. } => Some("L003"),
            Self::TooManyBlocks { .. } => Some("L004"),
            Self::RadioMisconfigured(_) => Some("L005"),
            Self::Transport(_) => Some("L006"),
            Self::Timeout(_) => Some("L007"),
            Self::Alphabet(_) => Some("L008"),
            Self::Codec(_) => Some("L009"),
            Self::Integrity { .. } => Some("L010"),
            Self::DuplicateConflict(_) => Some("L011"),
            _ => None,
        }
    }

    /// Returns whether re-invoking the transfer may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::Alphabet(_)
                | Self::Codec(_)
                | Self::Integrity { .. }
                | Self::RemoteIntegrityFailure
                | Self::RemoteDecodeFailure
                | Self::Interrupted
        )
    }

    /// Returns whether this error was detected before anything was transmitted.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::FileNameTooLong { .. }
                | Self::InvalidFileName(_)
                | Self::OtaSizeExceeded { .. }
                | Self::TooManyBlocks { .. }
                | Self::RadioMisconfigured(_)
                | Self::ConfigError(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::FileNameTooLong { .. } => Some("Rename the file to 32 characters or fewer."),
            Self::OtaSizeExceeded { .. } => {
                Some("Use a faster mode (lower mode number) or send a smaller file.")
            }
            Self::Timeout(_) => Some(
                "Check that both stations use the same mode and channel, then try again.",
            ),
            Self::DuplicateConflict(_) => Some(
                "The receiving station already has a different file with this name.\n\
                 Rename or remove one of them and try again.",
            ),
            Self::Alphabet(_)
            | Self::Codec(_)
            | Self::Integrity { .. }
            | Self::RemoteIntegrityFailure
            | Self::RemoteDecodeFailure => Some("Run the transfer again to retry."),
            Self::Interrupted => Some("Run the transfer again to resume from the checkpoint."),
            Self::RadioMisconfigured(_) => Some(
                "Disconnect and reconnect the radio, then try again.",
            ),
            _ => None,
        }
    }
}
