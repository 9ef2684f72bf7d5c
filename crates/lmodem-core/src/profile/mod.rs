//! LMODEM mode and channel table.
//!
//! A *mode* bundles the physical radio parameters with the protocol limits
//! that depend on them. A *channel* is a center frequency. Both stations must
//! select the same mode and channel out of band; nothing here is negotiated.
//!
//! | Mode | Power | Bandwidth | SF | CR  | Watchdog | Block width | Max OTA |
//! |------|-------|-----------|----|-----|----------|-------------|---------|
//! | 1    | 6     | 500 kHz   | 8  | 4/6 | 1000 ms  | 256         | 48 KiB  |
//! | 2    | 12    | 250 kHz   | 10 | 4/7 | 2000 ms  | 256         | 32 KiB  |
//! | 3    | 17    | 125 kHz   | 12 | 4/8 | 5000 ms  | 128         | 16 KiB  |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Forward error correction coding rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodingRate {
    /// 4/5
    Cr45,
    /// 4/6
    Cr46,
    /// 4/7
    Cr47,
    /// 4/8
    Cr48,
}

impl fmt::Display for CodingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cr45 => "4/5",
            Self::Cr46 => "4/6",
            Self::Cr47 => "4/7",
            Self::Cr48 => "4/8",
        };
        f.write_str(s)
    }
}

impl FromStr for CodingRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "4/5" => Ok(Self::Cr45),
            "4/6" => Ok(Self::Cr46),
            "4/7" => Ok(Self::Cr47),
            "4/8" => Ok(Self::Cr48),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown coding rate '{other}'"
            ))),
        }
    }
}

/// Physical radio parameters as applied to, or read back from, the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioParams {
    /// Transmit power in dBm
    pub power: i8,
    /// Bandwidth in kHz
    pub bandwidth_khz: u16,
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Coding rate
    pub coding_rate: CodingRate,
    /// Watchdog timer in milliseconds
    pub watchdog_ms: u32,
}

/// An LMODEM mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Mode number
    pub id: u8,
    /// Radio parameters for this mode
    pub params: RadioParams,
    /// Hex characters per block
    pub block_width: usize,
    /// Characters of missing-index list that fit in one block request
    pub max_request_length: usize,
    /// Maximum radix-85 text size in bytes
    pub max_ota_size: usize,
}

impl Profile {
    /// The link's receive timeout for this mode.
    #[must_use]
    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(u64::from(self.params.watchdog_ms))
    }

    /// Confirm that parameters read back from the radio match this mode.
    #[must_use]
    pub fn matches(&self, observed: &RadioParams) -> bool {
        self.params == *observed
    }
}

/// An LMODEM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Channel number
    pub id: u8,
    /// Center frequency in Hz
    pub frequency: u32,
}

impl Channel {
    /// Confirm that the frequency read back from the radio matches this channel.
    #[must_use]
    pub const fn verify_applied(&self, observed_frequency: u32) -> bool {
        self.frequency == observed_frequency
    }

    /// Frequency in MHz, for display.
    #[must_use]
    pub fn megahertz(&self) -> f64 {
        f64::from(self.frequency) / 1_000_000.0
    }
}

const MODES: [Profile; 3] = [
    Profile {
        id: 1,
        params: RadioParams {
            power: 6,
            bandwidth_khz: 500,
            spreading_factor: 8,
            coding_rate: CodingRate::Cr46,
            watchdog_ms: 1000,
        },
        block_width: 256,
        max_request_length: 127,
        max_ota_size: 49_152,
    },
    Profile {
        id: 2,
        params: RadioParams {
            power: 12,
            bandwidth_khz: 250,
            spreading_factor: 10,
            coding_rate: CodingRate::Cr47,
            watchdog_ms: 2000,
        },
        block_width: 256,
        max_request_length: 127,
        max_ota_size: 32_768,
    },
    Profile {
        id: 3,
        params: RadioParams {
            power: 17,
            bandwidth_khz: 125,
            spreading_factor: 12,
            coding_rate: CodingRate::Cr48,
            watchdog_ms: 5000,
        },
        block_width: 128,
        max_request_length: 63,
        max_ota_size: 16_384,
    },
];

const CHANNELS: [Channel; 3] = [
    Channel {
        id: 1,
        frequency: 914_000_000,
    },
    Channel {
        id: 2,
        frequency: 915_000_000,
    },
    Channel {
        id: 3,
        frequency: 916_000_000,
    },
];

/// Default mode when none is configured.
pub const DEFAULT_MODE: u8 = 1;

/// Default channel when none is configured.
pub const DEFAULT_CHANNEL: u8 = 2;

/// Look up a mode by number.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] for ids outside the table.
pub fn resolve_mode(id: u8) -> Result<Profile> {
    MODES
        .iter()
        .find(|m| m.id == id)
        .copied()
        .ok_or_else(|| {
            Error::InvalidConfiguration(format!("mode {id} does not exist (valid: 1, 2, 3)"))
        })
}

/// Look up a channel by number.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] for ids outside the table.
pub fn resolve_channel(id: u8) -> Result<Channel> {
    CHANNELS
        .iter()
        .find(|c| c.id == id)
        .copied()
        .ok_or_else(|| {
            Error::InvalidConfiguration(format!("channel {id} does not exist (valid: 1, 2, 3)"))
        })
}

/// Check read-back parameters against a mode. Unknown modes never match.
#[must_use]
pub fn verify_applied(mode_id: u8, observed: &RadioParams) -> bool {
    resolve_mode(mode_id).is_ok_and(|m| m.matches(observed))
}

/// All modes in the table.
pub fn modes() -> impl Iterator<Item = &'static Profile> {
    MODES.iter()
}

/// All channels in the table.
pub fn channels() -> impl Iterator<Item = &'static Channel> {
    CHANNELS.iter()
}

/// Identify which mode, if any, a set of read-back parameters corresponds to.
#[must_use]
pub fn identify_mode(observed: &RadioParams) -> Option<u8> {
    MODES.iter().find(|m| m.matches(observed)).map(|m| m.id)
}
