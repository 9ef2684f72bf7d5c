//! Sending side of a transfer.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CancelToken, Link, Outcome, SessionConfig, SessionState, TransferProgress};
use crate::block::BlockIndex;
use crate::codec::{self, EncodedFile};
use crate::error::{Error, Result};
use crate::file::{self, FileManifest, Fingerprint};
use crate::profile::Profile;
use crate::protocol::{self, Control};
use crate::transport::{Received, Transport};

/// A file encoded for one mode and ready to offer.
///
/// Everything that can be rejected locally (name, size, block count) is
/// checked here, before the radio is touched.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    /// Source path
    pub path: PathBuf,
    /// Manifest announced to the receiver
    pub manifest: FileManifest,
    /// Encoded blocks
    pub encoded: EncodedFile,
}

impl PreparedFile {
    /// Read and encode `path` for `profile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, its name cannot travel in
    /// a manifest, or it is too large for the mode.
    pub fn load(path: &Path, profile: &Profile) -> Result<Self> {
        let name = file::manifest_name(path)?;
        let data = fs::read(path)?;
        let encoded = codec::encode(&data, profile)?;

        let manifest = FileManifest {
            name,
            size_on_disk: data.len() as u64,
            size_ota: encoded.ota_size as u64,
            block_count: encoded.block_count(),
            fingerprint: Fingerprint::of_bytes(&data),
        };

        tracing::info!(
            file = %manifest.name,
            size = manifest.size_on_disk,
            ota = manifest.size_ota,
            blocks = manifest.block_count,
            fingerprint = %manifest.fingerprint,
            "Prepared file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            encoded,
        })
    }
}

/// Offers one file to a receiving station.
pub struct SendSession<T> {
    link: Link<T>,
    file: PreparedFile,
}

impl<T: Transport> SendSession<T> {
    /// Create a session over an already configured transport.
    pub fn new(transport: T, profile: Profile, file: PreparedFile) -> Self {
        let mut link = Link::new(transport, profile);
        link.progress.file_name = Some(file.manifest.name.clone());
        link.progress.file_size = Some(file.manifest.size_on_disk);
        link.progress.blocks_total = file.manifest.block_count;
        Self { link, file }
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

    /// The manifest this session offers.
    #[must_use]
    pub fn manifest(&self) -> &FileManifest {
        &self.file.manifest
    }

    /// Run the session to its end.
    ///
    /// # Errors
    ///
    /// Returns an error if the link fails, the receiver rejects or fails to
    /// verify the file, or the session is cancelled.
    pub fn run(mut self) -> Result<Outcome> {
        let result = self.exchange();
        let state = match &result {
            Ok(Outcome::Completed | Outcome::DuplicateVerified) => SessionState::Complete,
            Ok(Outcome::Incomplete) => SessionState::Incomplete,
            Err(_) => SessionState::Aborted,
        };
        self.link.update_state(state);

        match &result {
            Ok(outcome) => tracing::info!(file = %self.file.manifest.name, ?outcome, "Send finished"),
            Err(e) => tracing::warn!(file = %self.file.manifest.name, error = %e, "Send failed"),
        }
        result
    }

    fn exchange(&mut self) -> Result<Outcome> {
        self.handshake()?;

        self.link.update_state(SessionState::ExchangingManifest);
        self.link
            .send_control(&Control::Manifest(self.file.manifest.clone()))?;

        let window = self.link.exchange_window();
        let reply = self
            .link
            .await_control(window)?
            .ok_or(Error::Timeout("awaiting reply to file details"))?;

        match reply {
            Control::DuplicatePass => {
                tracing::info!(
                    file = %self.file.manifest.name,
                    "Receiver already holds an identical file"
                );
                return Ok(Outcome::DuplicateVerified);
            }
            Control::DuplicateFail => {
                return Err(Error::DuplicateConflict(self.file.manifest.name.clone()));
            }
            Control::BlockRequest { received, missing } => self.deliver(received, &missing)?,
            Control::CompleteCodecFail => return Err(Error::RemoteDecodeFailure),
            other => {
                return Err(Error::UnexpectedReply {
                    expected: "block request",
                    actual: other.to_string(),
                })
            }
        }

        self.link.update_state(SessionState::Verifying);
        let reply_timeout = self.link.config.reply_timeout;
        let verdict = self
            .link
            .await_control(reply_timeout)?
            .ok_or(Error::Timeout("awaiting transfer result"))?;
        self.link.log_link_quality();

        match verdict {
            Control::CompletePass => Ok(Outcome::Completed),
            Control::Incomplete => Ok(Outcome::Incomplete),
            Control::CompleteFail => Err(Error::RemoteIntegrityFailure),
            Control::CompleteCodecFail => Err(Error::RemoteDecodeFailure),
            other => Err(Error::UnexpectedReply {
                expected: "transfer result",
                actual: other.to_string(),
            }),
        }
    }

    /// Listen for the receiver's beacon and echo it once.
    fn handshake(&mut self) -> Result<()> {
        self.link.update_state(SessionState::Handshaking);
        let watchdog = self.link.profile.watchdog();
        loop {
            match self.link.receive(watchdog)? {
                Received::Frame(frame) => {
                    if matches!(protocol::parse_control(&frame), Ok(Control::Handshake)) {
                        self.link.send_control(&Control::Handshake)?;
                        break;
                    }
                    tracing::debug!("Ignoring frame while connecting");
                }
                Received::Timeout => {}
            }
        }
        tracing::info!("Connected to receiving station");
        Ok(())
    }

    fn deliver(&mut self, received: usize, missing: &[BlockIndex]) -> Result<()> {
        self.link.update_state(SessionState::DeliveringBlocks);

        let block_count = self.file.encoded.block_count();
        let requested: Vec<BlockIndex> = if received == 0 {
            BlockIndex::range(block_count).collect()
        } else {
            missing.to_vec()
        };

        if received == 0 {
            tracing::info!(blocks = block_count, "Starting transfer");
        } else {
            tracing::info!(
                received,
                requested = requested.len(),
                "Resuming transfer"
            );
        }

        self.link.progress.blocks_done = received.min(block_count);
        self.link.report();

        for index in requested {
            let Some(block) = self.file.encoded.block(index) else {
                tracing::warn!(block = %index, "Requested block does not exist, skipping");
                continue;
            };
            let frame = protocol::frame_data(block);
            self.link.transmit(&frame)?;
            tracing::debug!(block = %index, "Sent block");

            self.link.progress.blocks_done = (self.link.progress.blocks_done + 1).min(block_count);
            self.link.report();
        }

        self.link.send_control(&Control::EndOfTransmission)?;
        tracing::info!("All requested blocks sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::resolve_mode;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_builds_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello over the air").unwrap();

        let mode = resolve_mode(1).unwrap();
        let prepared = PreparedFile::load(&path, &mode).unwrap();
        assert_eq!(prepared.manifest.name, "hello.txt");
        assert_eq!(prepared.manifest.size_on_disk, 18);
        assert_eq!(prepared.manifest.block_count, prepared.encoded.block_count());
        assert_eq!(
            prepared.manifest.fingerprint,
            Fingerprint::of_bytes(b"hello over the air")
        );
    }

    #[test]
    fn test_prepare_rejects_long_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("{}.txt", "n".repeat(40)));
        fs::write(&path, b"x").unwrap();

        let mode = resolve_mode(1).unwrap();
        assert!(matches!(
            PreparedFile::load(&path, &mode),
            Err(Error::FileNameTooLong { .. })
        ));
    }

    #[test]
    fn test_prepare_missing_file() {
        let mode = resolve_mode(1).unwrap();
        assert!(matches!(
            PreparedFile::load(Path::new("/nonexistent/lmodem/file.bin"), &mode),
            Err(Error::Io(_))
        ));
    }
}
