//! Receiving side of a transfer.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{CancelToken, Link, Outcome, SessionConfig, SessionState, TransferProgress};
use crate::block::Block;
use crate::codec;
use crate::error::{Error, Result};
use crate::file::{self, FileManifest, Fingerprint};
use crate::profile::Profile;
use crate::protocol::{self, Control, Packet};
use crate::transfer::{CheckpointStore, Ledger};
use crate::transport::{Received, Transport};

/// Accepts one file from a sending station into an output directory.
pub struct ReceiveSession<T> {
    link: Link<T>,
    output_dir: PathBuf,
    checkpoints: CheckpointStore,
}

impl<T: Transport> ReceiveSession<T> {
    /// Create a session writing into `output_dir`, with checkpoints kept
    /// alongside the received files.
    pub fn new(transport: T, profile: Profile, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            link: Link::new(transport, profile),
            checkpoints: CheckpointStore::new(output_dir.clone()),
            output_dir,
        }
    }

    /// Keep checkpoints in `dir` instead of the output directory.
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoints = CheckpointStore::new(dir);
        self
    }

    /// Override the session tunables.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.link.config = config;
        self
    }

    /// Stop the session when `token` is cancelled.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.link.cancel = token;
        self
    }

    /// Call `callback` on every progress change.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&TransferProgress) + Send + 'static,
    {
        self.link.callback = Some(Box::new(callback));
        self
    }

    /// Directory received files are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run the session to its end.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails, the file conflicts with an
    /// existing one, the received file cannot be decoded or verified, or the
    /// session is cancelled.
    pub fn run(mut self) -> Result<Outcome> {
        let result = self.exchange();
        let state = match &result {
            Ok(Outcome::Completed | Outcome::DuplicateVerified) => SessionState::Complete,
            Ok(Outcome::Incomplete) => SessionState::Incomplete,
            Err(_) => SessionState::Aborted,
        };
        self.link.update_state(state);

        match &result {
            Ok(outcome) => tracing::info!(?outcome, "Receive finished"),
            Err(e) => tracing::warn!(error = %e, "Receive failed"),
        }
        result
    }

    fn exchange(&mut self) -> Result<Outcome> {
        self.handshake()?;

        self.link.update_state(SessionState::ExchangingManifest);
        let manifest = self.await_manifest()?;

        tracing::info!(
            file = %manifest.name,
            size = manifest.size_on_disk,
            ota = manifest.size_ota,
            blocks = manifest.block_count,
            fingerprint = %manifest.fingerprint,
            "Incoming file"
        );
        self.link.progress.file_name = Some(manifest.name.clone());
        self.link.progress.file_size = Some(manifest.size_on_disk);
        self.link.progress.blocks_total = manifest.block_count;

        let target = file::target_path(&self.output_dir, &manifest.name)?;
        if target.exists() {
            return self.resolve_duplicate(&manifest, &target);
        }

        self.link.update_state(SessionState::RequestingBlocks);
        let mut ledger = match self.checkpoints.take(&manifest) {
            Some(ledger) => ledger,
            None => Ledger::new(manifest.fingerprint, manifest.block_count)
                .map_err(|e| self.reject(e))?,
        };
        self.link.progress.blocks_done = ledger.received_count();
        self.link.report();

        let collected = self.collect(&manifest, &mut ledger);
        self.link.log_link_quality();
        if let Err(e) = collected {
            self.persist(&manifest, &ledger);
            return Err(e);
        }

        self.verify(&manifest, &target, &ledger)
    }

    /// Wait for the file details.
    ///
    /// Control text that is not a usable manifest ends the session, and the
    /// sender is told so instead of being left to time out. Frames that are
    /// not control text at all are ignored.
    fn await_manifest(&mut self) -> Result<FileManifest> {
        let deadline = Instant::now() + self.link.exchange_window();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout("awaiting file details"));
            }
            let Received::Frame(frame) = self.link.receive(remaining)? else {
                continue;
            };
            match protocol::parse_control(&frame) {
                Ok(Control::Manifest(manifest)) => return Ok(manifest),
                Ok(Control::Handshake) => tracing::debug!("Skipping stale handshake"),
                Ok(other) => {
                    return Err(self.reject(Error::UnexpectedReply {
                        expected: "file details",
                        actual: other.to_string(),
                    }))
                }
                Err(e) if protocol::is_control_text(&frame) => return Err(self.reject(e)),
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable packet"),
            }
        }
    }

    /// Tell the sender the file details were refused.
    fn reject(&mut self, error: Error) -> Error {
        tracing::warn!(error = %error, "Refusing file details");
        self.link.notify_peer(&Control::CompleteCodecFail);
        error
    }

    /// Beacon the handshake until the sender echoes it.
    fn handshake(&mut self) -> Result<()> {
        self.link.update_state(SessionState::Handshaking);
        let watchdog = self.link.profile.watchdog();
        loop {
            self.link.send_control(&Control::Handshake)?;
            match self.link.receive(watchdog)? {
                Received::Frame(frame) => {
                    if matches!(protocol::parse_control(&frame), Ok(Control::Handshake)) {
                        break;
                    }
                    tracing::debug!("Ignoring frame while connecting");
                }
                Received::Timeout => {}
            }
        }
        tracing::info!("Connected to sending station");
        Ok(())
    }

    fn resolve_duplicate(&mut self, manifest: &FileManifest, target: &Path) -> Result<Outcome> {
        let existing = Fingerprint::of_file(target)?;
        if existing == manifest.fingerprint {
            tracing::info!(file = %manifest.name, "Identical file already present");
            self.link.notify_peer(&Control::DuplicatePass);
            Ok(Outcome::DuplicateVerified)
        } else {
            tracing::warn!(
                file = %manifest.name,
                existing = %existing,
                incoming = %manifest.fingerprint,
                "A different file with this name already exists"
            );
            self.link.notify_peer(&Control::DuplicateFail);
            Err(Error::DuplicateConflict(manifest.name.clone()))
        }
    }

    /// Request what is missing and gather blocks until the sender signals
    /// the end or the link stays silent too long.
    fn collect(&mut self, manifest: &FileManifest, ledger: &mut Ledger) -> Result<()> {
        let request = Control::block_request(
            ledger.received_count(),
            &ledger.missing_indices(),
            self.link.profile.max_request_length,
        );
        if ledger.received_count() == 0 {
            tracing::info!(blocks = manifest.block_count, "Starting transfer");
        } else {
            tracing::info!(
                received = ledger.received_count(),
                total = manifest.block_count,
                "Resuming transfer"
            );
        }
        self.link.send_control(&request)?;

        self.link.update_state(SessionState::DeliveringBlocks);
        let watchdog = self.link.profile.watchdog();
        let limit = self.link.config.max_consecutive_timeouts;
        let mut silent = 0;

        while silent < limit {
            let frame = match self.link.receive(watchdog) {
                Ok(Received::Frame(frame)) => frame,
                Ok(Received::Timeout) => {
                    silent += 1;
                    tracing::debug!(silent, limit, "Receive timed out");
                    continue;
                }
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) => {
                    silent += 1;
                    tracing::warn!(error = %e, silent, limit, "Receive failed");
                    continue;
                }
            };
            silent = 0;

            match protocol::parse_delivery(&frame) {
                Ok(Packet::Control(Control::EndOfTransmission)) => {
                    tracing::debug!("End of transmission");
                    return Ok(());
                }
                Ok(Packet::Data(block)) => self.store(manifest, ledger, block),
                Ok(Packet::Control(other)) => {
                    tracing::debug!(control = %other, "Ignoring control packet during delivery");
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed packet"),
            }
        }

        tracing::warn!(
            limit,
            received = ledger.received_count(),
            total = ledger.block_count(),
            "Link silent, ending collection"
        );
        Ok(())
    }

    fn store(&mut self, manifest: &FileManifest, ledger: &mut Ledger, block: Block) {
        let index = block.index;
        if let Some(expected) = expected_width(manifest, &self.link.profile, index.get()) {
            if block.payload.len() != expected {
                tracing::warn!(
                    block = %index,
                    width = block.payload.len(),
                    expected,
                    "Discarding block of wrong width"
                );
                return;
            }
        }

        match ledger.mark_received(index, block.payload) {
            Ok(true) => {
                tracing::debug!(block = %index, "Received block");
                self.link.progress.blocks_done = ledger.received_count();
                self.link.report();
            }
            Ok(false) => tracing::debug!(block = %index, "Duplicate block"),
            Err(e) => tracing::warn!(error = %e, "Discarding block"),
        }
    }

    fn verify(&mut self, manifest: &FileManifest, target: &Path, ledger: &Ledger) -> Result<Outcome> {
        self.link.update_state(SessionState::Verifying);

        if !ledger.is_complete() {
            let saved = self.checkpoints.save(&manifest.name, ledger);
            tracing::warn!(
                file = %manifest.name,
                missing = ledger.missing_indices().len(),
                "Transfer incomplete, run again to resume"
            );
            self.link.notify_peer(&Control::Incomplete);
            saved?;
            return Ok(Outcome::Incomplete);
        }

        let data = match codec::decode(&ledger.blocks(), &self.link.profile) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(file = %manifest.name, error = %e, "Received blocks do not decode");
                self.link.notify_peer(&Control::CompleteCodecFail);
                return Err(e);
            }
        };

        if let Err(e) = fs::write(target, &data) {
            self.link.notify_peer(&Control::CompleteFail);
            return Err(e.into());
        }

        let actual = Fingerprint::of_file(target)?;
        if actual != manifest.fingerprint {
            tracing::warn!(
                file = %manifest.name,
                expected = %manifest.fingerprint,
                actual = %actual,
                "Integrity check failed, removing file"
            );
            if let Err(e) = fs::remove_file(target) {
                tracing::warn!(path = %target.display(), error = %e, "Failed to remove file");
            }
            self.link.notify_peer(&Control::CompleteFail);
            return Err(Error::Integrity {
                file: manifest.name.clone(),
                expected: manifest.fingerprint.to_string(),
                actual: actual.to_string(),
            });
        }

        if let Err(e) = self.checkpoints.delete(&manifest.name) {
            tracing::warn!(error = %e, "Failed to delete checkpoint");
        }
        tracing::info!(file = %manifest.name, path = %target.display(), "Integrity check passed");
        self.link.notify_peer(&Control::CompletePass);
        Ok(Outcome::Completed)
    }

    /// Save whatever arrived so a later run can resume.
    fn persist(&self, manifest: &FileManifest, ledger: &Ledger) {
        if ledger.received_count() == 0 {
            return;
        }
        match self.checkpoints.save(&manifest.name, ledger) {
            Ok(path) => tracing::info!(path = %path.display(), "Checkpoint saved"),
            Err(e) => tracing::warn!(error = %e, "Failed to save checkpoint"),
        }
    }
}

/// Exact payload width of block `index`, when the manifest pins it down.
fn expected_width(manifest: &FileManifest, profile: &Profile, index: usize) -> Option<usize> {
    let count = manifest.block_count;
    if index + 1 < count {
        return Some(profile.block_width);
    }
    let total = usize::try_from(manifest.size_ota).ok()?.checked_mul(2)?;
    let full = count.checked_sub(1)?.checked_mul(profile.block_width)?;
    let last = total.checked_sub(full)?;
    (1..=profile.block_width).contains(&last).then_some(last)
}
