//! Receive-side transfer ledger.
//!
//! The ledger records, for every block of the file being received, either
//! its payload or that it is still missing. It survives process restarts as a
//! checkpoint file keyed by the file fingerprint, so a later run only asks
//! for what is still missing.
//!
//! ## Checkpoint Format
//!
//! ```json
//! {
//!   "fingerprint": "2cf24dba5fb0a30e26e83b2ac5b9e29e",
//!   "block_count": 3,
//!   "blocks": { "000": "58...", "001": "", "002": "7a..." },
//!   "saved_at": "2024-05-01T12:00:00Z"
//! }
//! ```
//!
//! An empty string marks a missing block.

pub mod checkpoint;

pub use checkpoint::{CheckpointStore, CheckpointSummary, CHECKPOINT_EXTENSION};

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockIndex, MAX_BLOCKS};
use crate::error::{Error, Result};
use crate::file::Fingerprint;

/// Per-block receive state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    fingerprint: Fingerprint,
    slots: Vec<Option<String>>,
}

/// On-disk form of a ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Fingerprint of the file being received
    pub fingerprint: String,
    /// Total blocks in the transfer
    pub block_count: usize,
    /// Zero-padded index to payload, empty when missing
    pub blocks: BTreeMap<String, String>,
    /// When the checkpoint was written
    pub saved_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// Blocks held in this record.
    #[must_use]
    pub fn received_count(&self) -> usize {
        self.blocks.values().filter(|p| !p.is_empty()).count()
    }
}

impl Ledger {
    /// Create an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyBlocks`] if `block_count` exceeds what a block
    /// index can address.
    pub fn new(fingerprint: Fingerprint, block_count: usize) -> Result<Self> {
        if block_count > MAX_BLOCKS {
            return Err(Error::TooManyBlocks {
                count: block_count,
                limit: MAX_BLOCKS,
            });
        }
        Ok(Self {
            fingerprint,
            slots: vec![None; block_count],
        })
    }

    /// Fingerprint of the file this ledger collects.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Total blocks in the transfer.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.slots.len()
    }

    /// Store a received block.
    ///
    /// Returns `true` if the block was new. A repeat delivery leaves the
    /// first payload in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if the index is past the end of the
    /// transfer.
    pub fn mark_received(&mut self, index: BlockIndex, payload: String) -> Result<bool> {
        let count = self.slots.len();
        let slot = self.slots.get_mut(index.get()).ok_or_else(|| {
            Error::MalformedPacket(format!("block {index} is outside a {count}-block transfer"))
        })?;
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(payload);
        Ok(true)
    }

    /// Indices still missing, ascending.
    #[must_use]
    pub fn missing_indices(&self) -> Vec<BlockIndex> {
        BlockIndex::range(self.slots.len())
            .filter(|i| self.slots[i.get()].is_none())
            .collect()
    }

    /// Number of blocks received.
    #[must_use]
    pub fn received_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether every block has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Received blocks in index order.
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        BlockIndex::range(self.slots.len())
            .filter_map(|i| {
                self.slots[i.get()]
                    .as_ref()
                    .map(|payload| Block::new(i, payload.clone()))
            })
            .collect()
    }

    /// Serialisable form of the ledger.
    #[must_use]
    pub fn to_record(&self) -> CheckpointRecord {
        let blocks = BlockIndex::range(self.slots.len())
            .map(|i| {
                let payload = self.slots[i.get()].clone().unwrap_or_default();
                (i.to_string(), payload)
            })
            .collect();
        CheckpointRecord {
            fingerprint: self.fingerprint.to_string(),
            block_count: self.slots.len(),
            blocks,
            saved_at: Utc::now(),
        }
    }

    /// Rebuild a ledger from its serialised form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the record belongs to another
    /// file, and [`Error::Serialization`] if it is internally inconsistent.
    pub fn from_record(record: &CheckpointRecord, expected: &Fingerprint) -> Result<Self> {
        let stored: Fingerprint = record.fingerprint.parse().map_err(|_| {
            Error::Serialization(format!(
                "checkpoint fingerprint '{}' is malformed",
                record.fingerprint
            ))
        })?;
        if stored != *expected {
            return Err(Error::ChecksumMismatch {
                expected: expected.to_string(),
                found: record.fingerprint.clone(),
            });
        }

        let mut ledger = Self::new(stored, record.block_count)?;
        for (key, payload) in &record.blocks {
            let index: BlockIndex = key
                .parse()
                .map_err(|_| Error::Serialization(format!("checkpoint block key '{key}'")))?;
            if payload.is_empty() {
                continue;
            }
            ledger
                .mark_received(index, payload.clone())
                .map_err(|e| Error::Serialization(e.to_string()))?;
        }
        Ok(ledger)
    }

    /// Write the ledger to `path`.
    ///
    /// The record goes to a temporary file first, is synced, then renamed
    /// over the target, so a crash never leaves a torn checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_record())
            .map_err(|e| Error::Serialization(format!("failed to serialize checkpoint: {e}")))?;

        let temp_path = temp_path_for(path);
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;

        tracing::debug!(
            fingerprint = %self.fingerprint,
            received = self.received_count(),
            total = self.block_count(),
            path = %path.display(),
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Read a ledger from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the checkpoint is for a
    /// different file, or an I/O or parse error.
    pub fn load(path: &Path, expected: &Fingerprint) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let record: CheckpointRecord = serde_json::from_str(&contents)
            .map_err(|e| Error::Serialization(format!("failed to parse checkpoint: {e}")))?;
        let ledger = Self::from_record(&record, expected)?;

        tracing::debug!(
            fingerprint = %expected,
            received = ledger.received_count(),
            total = ledger.block_count(),
            path = %path.display(),
            "Loaded checkpoint"
        );
        Ok(ledger)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn idx(n: usize) -> BlockIndex {
        BlockIndex::new(n).unwrap()
    }

    fn fp() -> Fingerprint {
        Fingerprint::of_bytes(b"ledger test")
    }

    #[test]
    fn test_fresh_ledger_misses_everything() {
        let ledger = Ledger::new(fp(), 5).unwrap();
        let missing: Vec<usize> = ledger.missing_indices().iter().map(|i| i.get()).collect();
        assert_eq!(missing, vec![0, 1, 2, 3, 4]);
        assert_eq!(ledger.received_count(), 0);
        assert!(!ledger.is_complete());
    }

    #[test]
    fn test_rejects_unaddressable_block_count() {
        assert!(Ledger::new(fp(), 999).is_ok());
        assert!(matches!(
            Ledger::new(fp(), 1000),
            Err(Error::TooManyBlocks { .. })
        ));
    }

    #[test]
    fn test_mark_received_is_idempotent() {
        let mut ledger = Ledger::new(fp(), 3).unwrap();
        assert!(ledger.mark_received(idx(1), "aa".to_string()).unwrap());
        assert!(!ledger.mark_received(idx(1), "bb".to_string()).unwrap());
        assert_eq!(ledger.received_count(), 1);
        assert_eq!(ledger.blocks()[0].payload, "aa");
    }

    #[test]
    fn test_mark_received_rejects_out_of_range() {
        let mut ledger = Ledger::new(fp(), 3).unwrap();
        assert!(matches!(
            ledger.mark_received(idx(3), "aa".to_string()),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_completion_and_block_order() {
        let mut ledger = Ledger::new(fp(), 3).unwrap();
        for n in [2, 0, 1] {
            ledger.mark_received(idx(n), format!("{n}{n}")).unwrap();
        }
        assert!(ledger.is_complete());
        assert!(ledger.missing_indices().is_empty());
        let payloads: Vec<String> = ledger.blocks().into_iter().map(|b| b.payload).collect();
        assert_eq!(payloads, vec!["00", "11", "22"]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin.lmodem-resume");

        let mut ledger = Ledger::new(fp(), 4).unwrap();
        ledger.mark_received(idx(0), "0a0b".to_string()).unwrap();
        ledger.mark_received(idx(3), "0c".to_string()).unwrap();
        ledger.save(&path).unwrap();

        assert!(!temp_path_for(&path).exists());
        let loaded = Ledger::load(&path, &fp()).unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.missing_indices(), vec![idx(1), idx(2)]);
    }

    #[test]
    fn test_load_rejects_other_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.lmodem-resume");
        Ledger::new(fp(), 2).unwrap().save(&path).unwrap();

        let other = Fingerprint::of_bytes(b"something else");
        assert!(matches!(
            Ledger::load(&path, &other),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_record_uses_padded_keys() {
        let mut ledger = Ledger::new(fp(), 12).unwrap();
        ledger.mark_received(idx(11), "ff".to_string()).unwrap();
        let record = ledger.to_record();
        assert_eq!(record.blocks.len(), 12);
        assert_eq!(record.blocks["011"], "ff");
        assert_eq!(record.blocks["000"], "");
        assert_eq!(record.received_count(), 1);
    }
}
