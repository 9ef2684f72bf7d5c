//! Checkpoint files for interrupted receives.
//!
//! A receive that ends with blocks missing leaves `<name>.lmodem-resume` in
//! the checkpoint directory. The next receive of the same name takes it
//! (load and delete) if its fingerprint matches the incoming manifest.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{CheckpointRecord, Ledger};
use crate::error::{Error, Result};
use crate::file::FileManifest;

/// File extension for checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = ".lmodem-resume";

/// Summary of a checkpoint on disk, for listing.
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    /// Name of the file being received
    pub file_name: String,
    /// Path of the checkpoint file
    pub path: PathBuf,
    /// Fingerprint of the file being received
    pub fingerprint: String,
    /// Blocks held
    pub received: usize,
    /// Total blocks
    pub block_count: usize,
    /// When the checkpoint was written
    pub saved_at: DateTime<Utc>,
}

/// Manages checkpoint files in one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Use `dir` for checkpoints.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The checkpoint directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint for a target file name.
    #[must_use]
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(format!("{file_name}{CHECKPOINT_EXTENSION}"))
    }

    /// Take the checkpoint matching `manifest`, if one is usable.
    ///
    /// The checkpoint file is removed whenever one exists. A checkpoint for a
    /// different file, one that cannot be parsed, one whose block count
    /// disagrees with the manifest, or one that is already complete is
    /// reported and discarded.
    pub fn take(&self, manifest: &FileManifest) -> Option<Ledger> {
        let path = self.path_for(&manifest.name);
        if !path.exists() {
            return None;
        }

        let loaded = Ledger::load(&path, &manifest.fingerprint);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove checkpoint");
        }

        match loaded {
            Ok(ledger) if ledger.block_count() != manifest.block_count => {
                tracing::warn!(
                    file = %manifest.name,
                    stored = ledger.block_count(),
                    expected = manifest.block_count,
                    "Checkpoint block count does not match manifest, starting over"
                );
                None
            }
            Ok(ledger) if ledger.is_complete() => {
                tracing::warn!(file = %manifest.name, "Checkpoint is already complete, starting over");
                None
            }
            Ok(ledger) => {
                tracing::info!(
                    file = %manifest.name,
                    received = ledger.received_count(),
                    total = ledger.block_count(),
                    "Resuming from checkpoint"
                );
                Some(ledger)
            }
            Err(Error::ChecksumMismatch { found, .. }) => {
                tracing::warn!(
                    file = %manifest.name,
                    stored = %found,
                    expected = %manifest.fingerprint,
                    "Checkpoint belongs to a different file, starting over"
                );
                None
            }
            Err(e) => {
                tracing::warn!(file = %manifest.name, error = %e, "Unreadable checkpoint, starting over");
                None
            }
        }
    }

    /// Persist a ledger under `file_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, file_name: &str, ledger: &Ledger) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to create checkpoint directory: {e}"
            )))
        })?;
        let path = self.path_for(file_name);
        ledger.save(&path)?;
        Ok(path)
    }

    /// Remove the checkpoint for `file_name`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be deleted.
    pub fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.path_for(file_name);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "Deleted checkpoint");
        }
        Ok(())
    }

    /// Checkpoints in the directory, sorted by file name.
    ///
    /// Files that cannot be parsed are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(CHECKPOINT_EXTENSION))
                .map(str::to_string)
            else {
                continue;
            };

            let record = fs::read_to_string(&path)
                .ok()
                .and_then(|json| serde_json::from_str::<CheckpointRecord>(&json).ok());
            let Some(record) = record else {
                tracing::debug!(path = %path.display(), "Skipping unreadable checkpoint");
                continue;
            };

            summaries.push(CheckpointSummary {
                file_name,
                path,
                received: record.received_count(),
                fingerprint: record.fingerprint,
                block_count: record.block_count,
                saved_at: record.saved_at,
            });
        }

        summaries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(summaries)
    }

    /// Delete every checkpoint in the directory.
    ///
    /// # Returns
    ///
    /// The number of checkpoints removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for summary in self.list()? {
            if let Err(e) = fs::remove_file(&summary.path) {
                tracing::warn!(
                    path = %summary.path.display(),
                    error = %e,
                    "Failed to delete checkpoint"
                );
            } else {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockIndex;
    use crate::file::Fingerprint;
    use tempfile::TempDir;

    fn manifest(name: &str, data: &[u8], block_count: usize) -> FileManifest {
        FileManifest {
            name: name.to_string(),
            size_on_disk: data.len() as u64,
            size_ota: 100,
            block_count,
            fingerprint: Fingerprint::of_bytes(data),
        }
    }

    fn partial(manifest: &FileManifest) -> Ledger {
        let mut ledger = Ledger::new(manifest.fingerprint, manifest.block_count).unwrap();
        ledger
            .mark_received(BlockIndex::new(0).unwrap(), "aa".to_string())
            .unwrap();
        ledger
    }

    #[test]
    fn test_take_consumes_matching_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let m = manifest("a.txt", b"alpha", 3);

        store.save(&m.name, &partial(&m)).unwrap();
        let ledger = store.take(&m).unwrap();
        assert_eq!(ledger.received_count(), 1);
        assert!(!store.path_for("a.txt").exists());
        assert!(store.take(&m).is_none());
    }

    #[test]
    fn test_take_discards_other_fingerprint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let old = manifest("a.txt", b"alpha", 3);
        let new = manifest("a.txt", b"beta", 3);

        store.save(&old.name, &partial(&old)).unwrap();
        assert!(store.take(&new).is_none());
        assert!(!store.path_for("a.txt").exists());
    }

    #[test]
    fn test_take_discards_complete_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let m = manifest("one.bin", b"one", 1);

        store.save(&m.name, &partial(&m)).unwrap();
        assert!(store.take(&m).is_none());
    }

    #[test]
    fn test_take_discards_block_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let m = manifest("a.txt", b"alpha", 3);
        store.save(&m.name, &partial(&m)).unwrap();

        let mut resized = m.clone();
        resized.block_count = 4;
        assert!(store.take(&resized).is_none());
    }

    #[test]
    fn test_take_discards_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let m = manifest("a.txt", b"alpha", 3);
        fs::write(store.path_for(&m.name), "{ not json").unwrap();

        assert!(store.take(&m).is_none());
        assert!(!store.path_for(&m.name).exists());
    }

    #[test]
    fn test_list_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));
        assert!(store.list().unwrap().is_empty());

        let b = manifest("b.txt", b"b", 5);
        let a = manifest("a.txt", b"a", 2);
        store.save(&b.name, &partial(&b)).unwrap();
        store.save(&a.name, &partial(&a)).unwrap();
        fs::write(store.dir().join("unrelated.txt"), "x").unwrap();

        let listed = store.list().unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(listed[1].received, 1);
        assert_eq!(listed[1].block_count, 5);

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
        assert!(store.dir().join("unrelated.txt").exists());
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.delete("never.txt").unwrap();
    }
}
