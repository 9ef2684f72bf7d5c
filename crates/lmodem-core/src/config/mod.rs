//! Configuration management for LMODEM.
//!
//! Settings live in a TOML file. Every section is optional; anything left
//! out takes its default, and a missing file means all defaults.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/lmodem/config.toml` |
//! | macOS | `~/Library/Application Support/com.lmodem.LMODEM/config.toml` |
//! | Windows | `%APPDATA%\lmodem\LMODEM\config\config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [radio]
//! port = "/dev/ttyUSB0"
//!
//! [session]
//! mode = 3
//! channel = 1
//! reply_timeout = "30s"
//!
//! [storage]
//! output_dir = "/srv/inbox"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::{resolve_channel, resolve_mode, DEFAULT_CHANNEL, DEFAULT_MODE};
use crate::session::{SessionConfig, DEFAULT_REPLY_TIMEOUT, MAX_CONSECUTIVE_TIMEOUTS};

/// Port value that selects USB auto-detection.
pub const AUTO_PORT: &str = "auto";

/// Main configuration struct for LMODEM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Radio device settings
    pub radio: RadioConfig,
    /// Session settings
    pub session: SessionSettings,
    /// Where files and checkpoints go
    pub storage: StorageConfig,
}

/// Radio device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Serial port path, or `"auto"` to detect by USB id
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// USB vendor and product id used for detection, as `VVVV:PPPP`
    pub usb_id: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: 57_600,
            usb_id: "1A86:7523".to_string(),
        }
    }
}

impl RadioConfig {
    /// The explicit port, or `None` when auto-detection is configured.
    #[must_use]
    pub fn explicit_port(&self) -> Option<&str> {
        let port = self.port.trim();
        if port.is_empty() || port.eq_ignore_ascii_case(AUTO_PORT) {
            None
        } else {
            Some(port)
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Mode id from the profile table
    pub mode: u8,
    /// Channel id from the channel table
    pub channel: u8,
    /// Consecutive timeouts that end block collection
    pub max_consecutive_timeouts: u32,
    /// Sender's wait for the final verdict
    #[serde(with = "humantime_serde")]
    pub reply_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            channel: DEFAULT_CHANNEL,
            max_consecutive_timeouts: MAX_CONSECUTIVE_TIMEOUTS,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl SessionSettings {
    /// Check the mode and channel against the profile tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for an unknown mode or channel.
    pub fn validate(&self) -> Result<()> {
        resolve_mode(self.mode)?;
        resolve_channel(self.channel)?;
        Ok(())
    }

    /// Tunables handed to a session.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_consecutive_timeouts: self.max_consecutive_timeouts.max(1),
            reply_timeout: self.reply_timeout,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for received files (current directory when unset)
    pub output_dir: Option<PathBuf>,
    /// Directory for checkpoints (output directory when unset)
    pub checkpoint_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Output directory, falling back to the current directory.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Checkpoint directory, falling back to the output directory.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir
            .clone()
            .unwrap_or_else(|| self.output_dir())
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// names a mode or channel that does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.session.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "lmodem", "LMODEM")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();
        if let Some(millis) = s.strip_suffix("ms") {
            return millis
                .parse()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom);
        }
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.radio.port, "auto");
        assert_eq!(config.radio.baud_rate, 57_600);
        assert_eq!(config.session.mode, 1);
        assert_eq!(config.session.channel, 2);
        assert_eq!(config.session.max_consecutive_timeouts, 3);
        assert_eq!(config.session.reply_timeout, Duration::from_secs(15));
        assert!(config.storage.output_dir.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config").join("config.toml");

        let mut original = Config::default();
        original.radio.port = "/dev/ttyUSB3".to_string();
        original.session.mode = 3;
        original.session.reply_timeout = Duration::from_millis(2500);
        original.storage.output_dir = Some(PathBuf::from("/srv/inbox"));

        original.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.radio.explicit_port(), Some("/dev/ttyUSB3"));
        assert_eq!(loaded.session.mode, 3);
        assert_eq!(loaded.session.reply_timeout, Duration::from_millis(2500));
        assert_eq!(loaded.storage.output_dir, Some(PathBuf::from("/srv/inbox")));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[session]
channel = 3
reply_timeout = "1m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.session.channel, 3);
        assert_eq!(config.session.reply_timeout, Duration::from_secs(60));
        assert_eq!(config.session.mode, DEFAULT_MODE);
        assert_eq!(config.radio.usb_id, "1A86:7523");
    }

    #[test]
    fn test_load_rejects_unknown_mode_or_channel() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        for section in ["[session]\nchannel = 7\n", "[session]\nmode = 4\n"] {
            std::fs::write(&config_path, section).unwrap();
            assert!(
                matches!(
                    Config::load_from(&config_path),
                    Err(Error::InvalidConfiguration(_))
                ),
                "{section} should be rejected"
            );
        }

        std::fs::write(&config_path, "[session]\nmode = 3\nchannel = 1\n").unwrap();
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!((config.session.mode, config.session.channel), (3, 1));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.mode, DEFAULT_MODE);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nreply_timeout = \"soon\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_auto_port() {
        let mut radio = RadioConfig::default();
        assert_eq!(radio.explicit_port(), None);
        radio.port = "AUTO".to_string();
        assert_eq!(radio.explicit_port(), None);
        radio.port = "COM4".to_string();
        assert_eq!(radio.explicit_port(), Some("COM4"));
    }

    #[test]
    fn test_storage_fallbacks() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.checkpoint_dir(), PathBuf::from("."));
        storage.output_dir = Some(PathBuf::from("/data"));
        assert_eq!(storage.checkpoint_dir(), PathBuf::from("/data"));
        storage.checkpoint_dir = Some(PathBuf::from("/state"));
        assert_eq!(storage.checkpoint_dir(), PathBuf::from("/state"));
    }

    #[test]
    fn test_session_config_floor() {
        let settings = SessionSettings {
            max_consecutive_timeouts: 0,
            ..SessionSettings::default()
        };
        assert_eq!(settings.session_config().max_consecutive_timeouts, 1);
    }

    #[test]
    fn test_duration_serialization() {
        let toml_str = Config::default().to_toml().unwrap();
        assert!(toml_str.contains("reply_timeout = \"15s\""));
        assert!(toml_str.contains("[storage]"));
    }
}
