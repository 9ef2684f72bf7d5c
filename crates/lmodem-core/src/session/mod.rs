//! Sender and receiver state machines.
//!
//! Both roles walk the same states:
//!
//! ```text
//! Idle ─▶ Handshaking ─▶ ExchangingManifest ─┬─▶ Aborted (duplicate)
//!                                            └─▶ RequestingBlocks ─▶ DeliveringBlocks
//!                                                 ─▶ Verifying ─┬─▶ Complete
//!                                                               └─▶ Incomplete
//! ```
//!
//! One run performs the handshake and exactly one request/deliver pass. A
//! receive that ends with blocks missing leaves a checkpoint for the next
//! run.
//!
//! Sessions are synchronous and block on the transport. Cancellation is
//! cooperative: a [`CancelToken`] is checked before every transport call.

pub mod receiver;
pub mod sender;

pub use receiver::ReceiveSession;
pub use sender::{PreparedFile, SendSession};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::protocol::{self, Control};
use crate::transport::{Received, Transmission, Transport};

/// Consecutive empty receives that end block collection.
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// How long the sender waits for the receiver's verdict after delivery.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(15);

/// Session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Consecutive timeouts or link errors tolerated while collecting blocks
    pub max_consecutive_timeouts: u32,
    /// Sender's wait for the final verdict
    pub reply_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_timeouts: MAX_CONSECUTIVE_TIMEOUTS,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Where a session is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started
    Idle,
    /// Establishing the link
    Handshaking,
    /// Sending or awaiting the manifest and the receiver's answer to it
    ExchangingManifest,
    /// Receiver is asking for blocks
    RequestingBlocks,
    /// Blocks are on the air
    DeliveringBlocks,
    /// Receiver is reconstructing the file, or the sender awaits the verdict
    Verifying,
    /// File verified on the receiving side
    Complete,
    /// Blocks still missing; a checkpoint holds what arrived
    Incomplete,
    /// Session ended early
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Handshaking => "connecting",
            Self::ExchangingManifest => "exchanging file details",
            Self::RequestingBlocks => "requesting blocks",
            Self::DeliveringBlocks => "delivering blocks",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// How a session that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// File transferred and verified
    Completed,
    /// Receiver already held an identical file
    DuplicateVerified,
    /// Some blocks are still missing; run again to resume
    Incomplete,
}

impl Outcome {
    /// Whether the file is now on the receiving side.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::DuplicateVerified)
    }
}

/// Progress snapshot handed to the progress callback.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Current state
    pub state: SessionState,
    /// File name, once known
    pub file_name: Option<String>,
    /// Original file size, once known
    pub file_size: Option<u64>,
    /// Blocks held by the receiver, or accounted for by the sender
    pub blocks_done: usize,
    /// Blocks in the transfer
    pub blocks_total: usize,
    /// Accumulated transmit air time of this station
    pub air_time: Duration,
    /// When the session started
    pub started_at: Instant,
}

impl TransferProgress {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            file_name: None,
            file_size: None,
            blocks_done: 0,
            blocks_total: 0,
            air_time: Duration::ZERO,
            started_at: Instant::now(),
        }
    }

    /// Completion as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.blocks_total == 0 {
            0.0
        } else {
            (self.blocks_done as f64 / self.blocks_total as f64) * 100.0
        }
    }
}

/// Callback receiving progress snapshots.
pub type ProgressCallback = Box<dyn FnMut(&TransferProgress) + Send>;

/// Shared flag for stopping a session from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by both roles: the transport plus bookkeeping around it.
struct Link<T> {
    transport: T,
    profile: Profile,
    config: SessionConfig,
    cancel: CancelToken,
    progress: TransferProgress,
    callback: Option<ProgressCallback>,
    heard: bool,
}

impl<T: Transport> Link<T> {
    fn new(transport: T, profile: Profile) -> Self {
        Self {
            transport,
            profile,
            config: SessionConfig::default(),
            cancel: CancelToken::new(),
            progress: TransferProgress::new(),
            callback: None,
            heard: false,
        }
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    fn update_state(&mut self, state: SessionState) {
        tracing::debug!(from = ?self.progress.state, to = ?state, "Session state");
        self.progress.state = state;
        self.report();
    }

    fn report(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.progress);
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission> {
        self.check_cancel()?;
        let sent = self.transport.transmit(frame)?;
        self.progress.air_time += sent.air_time;
        Ok(sent)
    }

    fn send_control(&mut self, control: &Control) -> Result<Transmission> {
        tracing::debug!(control = %control, "Sending control packet");
        self.transmit(&protocol::frame_control(control))
    }

    /// Send a final verdict. The local result stands even if the peer never
    /// hears it.
    fn notify_peer(&mut self, control: &Control) {
        if let Err(e) = self.send_control(control) {
            tracing::warn!(control = %control, error = %e, "Failed to notify peer");
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received> {
        self.check_cancel()?;
        let received = self.transport.receive(timeout)?;
        if matches!(received, Received::Frame(_)) {
            self.heard = true;
        }
        Ok(received)
    }

    /// Log signal quality of the last frame heard, if any arrived since the
    /// previous query.
    ///
    /// Called between exchanges only, never inside the block loop.
    fn log_link_quality(&mut self) {
        if !std::mem::take(&mut self.heard) {
            return;
        }
        if let Some(quality) = self.transport.link_quality() {
            tracing::info!(rssi = quality.rssi, snr = quality.snr, "Link quality");
        }
    }

    /// Wait up to `limit` for a control packet other than a stale handshake.
    ///
    /// Unparseable frames are logged and skipped. Returns `None` once the
    /// time is up.
    fn await_control(&mut self, limit: Duration) -> Result<Option<Control>> {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.receive(remaining)? {
                Received::Timeout => {}
                Received::Frame(frame) => match protocol::parse_control(&frame) {
                    Ok(Control::Handshake) => {
                        tracing::debug!("Skipping stale handshake");
                    }
                    Ok(control) => return Ok(Some(control)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring unreadable packet");
                    }
                },
            }
        }
    }

    /// How long to wait for the peer's next step during the exchange phases.
    fn exchange_window(&self) -> Duration {
        self.profile.watchdog() * self.config.max_consecutive_timeouts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        assert!(Outcome::Completed.is_success());
        assert!(Outcome::DuplicateVerified.is_success());
        assert!(!Outcome::Incomplete.is_success());
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_progress_percentage() {
        let mut progress = TransferProgress::new();
        assert!(progress.percentage().abs() < f64::EPSILON);
        progress.blocks_total = 4;
        progress.blocks_done = 1;
        assert!((progress.percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_consecutive_timeouts, 3);
        assert_eq!(config.reply_timeout, Duration::from_secs(15));
    }
}
