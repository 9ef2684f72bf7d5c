//! File identity and metadata.
//!
//! This module handles:
//! - File name rules imposed by the manifest format
//! - Content fingerprints (truncated SHA-256)
//! - The file manifest and its pipe-delimited wire form
//!
//! ## Fingerprints
//!
//! A fingerprint is the first 16 bytes of the SHA-256 digest of the original
//! file, rendered as 32 lowercase hex characters. It keys checkpoints and is
//! compared after reconstruction.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::block::MAX_BLOCKS;
use crate::error::{Error, Result};

/// Longest file name the manifest can carry.
pub const MAX_FILE_NAME_LEN: usize = 32;

/// Bytes of the SHA-256 digest kept in a fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

const MANIFEST_SEPARATOR: char = '|';

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Content fingerprint of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Fingerprint a byte slice.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(data))
    }

    /// Fingerprint a file on disk, streaming its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Self::from_digest(&hasher.finalize()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Self(bytes)
    }

    /// Raw fingerprint bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != FINGERPRINT_LEN * 2
            || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(Error::MalformedPacket(format!("invalid fingerprint '{s}'")));
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::MalformedPacket(format!("invalid fingerprint '{s}': {e}")))?;
        Ok(Self(bytes))
    }
}

/// Check that a name can travel in a manifest and be written safely.
///
/// # Errors
///
/// Returns [`Error::FileNameTooLong`] past [`MAX_FILE_NAME_LEN`] characters
/// and [`Error::InvalidFileName`] for empty names, path separators, the
/// manifest separator, or control characters.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(Error::FileNameTooLong {
            name: name.to_string(),
            limit: MAX_FILE_NAME_LEN,
        });
    }
    if name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| c == MANIFEST_SEPARATOR || c == '/' || c == '\\' || c.is_control())
    {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Base name of `path` as the manifest will carry it.
///
/// # Errors
///
/// Returns an error if the path has no UTF-8 file name or the name is not
/// acceptable to [`validate_file_name`].
pub fn manifest_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))?;
    validate_file_name(name)?;
    Ok(name.to_string())
}

/// Where a received file named `name` lands inside `dir`.
///
/// # Errors
///
/// Returns an error if `name` could escape `dir`.
pub fn target_path(dir: &Path, name: &str) -> Result<PathBuf> {
    validate_file_name(name)?;
    Ok(dir.join(name))
}

/// Description of the file being transferred, sent once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    /// Base file name
    pub name: String,
    /// Size of the original file in bytes
    pub size_on_disk: u64,
    /// Radix-85 text size in bytes
    pub size_ota: u64,
    /// Number of blocks
    pub block_count: usize,
    /// Fingerprint of the original file
    pub fingerprint: Fingerprint,
}

impl FileManifest {
    /// Render the manifest as `name|size_on_disk|size_ota|block_count|fingerprint`.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.name, self.size_on_disk, self.size_ota, self.block_count, self.fingerprint
        )
    }

    /// Parse the pipe-delimited wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] unless the text has exactly five
    /// fields, numeric sizes, a block count in `1..=MAX_BLOCKS` and a
    /// well-formed fingerprint.
    pub fn from_wire(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split(MANIFEST_SEPARATOR).collect();
        let [name, size_on_disk, size_ota, block_count, fingerprint] = fields.as_slice() else {
            return Err(Error::MalformedPacket(format!(
                "manifest has {} fields, expected 5",
                fields.len()
            )));
        };

        let number = |field: &str, what: &str| -> Result<u64> {
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::MalformedPacket(format!(
                    "manifest {what} '{field}' is not a number"
                )));
            }
            field
                .parse()
                .map_err(|_| Error::MalformedPacket(format!("manifest {what} '{field}' overflows")))
        };

        let block_count = usize::try_from(number(*block_count, "block count")?)
            .map_err(|_| Error::MalformedPacket("manifest block count overflows".to_string()))?;
        if !(1..=MAX_BLOCKS).contains(&block_count) {
            return Err(Error::MalformedPacket(format!(
                "manifest block count {block_count} outside 1..={MAX_BLOCKS}"
            )));
        }

        validate_file_name(*name)
            .map_err(|e| Error::MalformedPacket(format!("manifest name rejected: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            size_on_disk: number(*size_on_disk, "size on disk")?,
            size_ota: number(*size_ota, "size over the air")?,
            block_count,
            fingerprint: fingerprint.parse()?,
        })
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
