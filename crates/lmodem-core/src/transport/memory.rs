//! In-process transport pair.
//!
//! Each end owns the receiving half of one unbounded channel and the sending
//! half of the other, so a frame transmitted on one end is received on the
//! other. Used for tests and loopback runs.

use std::time::{Duration, Instant};

use chrono::Utc;
use flume::{Receiver, RecvTimeoutError, Sender};

use super::{AppliedParams, Received, Transmission, Transport, TransportError};
use crate::profile::{Channel, Profile};

/// One end of a linked in-memory radio pair.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    applied: Option<AppliedParams>,
    receive_cap: Option<Duration>,
    frames_sent: usize,
}

impl MemoryTransport {
    /// Create two linked ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = flume::unbounded();
        let (b_tx, a_rx) = flume::unbounded();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx,
            rx,
            applied: None,
            receive_cap: None,
            frames_sent: 0,
        }
    }

    /// Bound every receive wait, whatever watchdog the caller asks for.
    ///
    /// Keeps tests fast when a profile's watchdog is several seconds long.
    #[must_use]
    pub fn with_receive_cap(mut self, cap: Duration) -> Self {
        self.receive_cap = Some(cap);
        self
    }

    /// Frames transmitted from this end so far.
    #[must_use]
    pub const fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Frames waiting to be received on this end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for MemoryTransport {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        self.applied = Some(AppliedParams {
            radio: profile.params,
            frequency: channel.frequency,
        });
        Ok(())
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        self.applied.ok_or(TransportError::NotConfigured)
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        let started = Instant::now();
        self.tx
            .send(frame.to_vec())
            .map_err(|_| TransportError::Disconnected)?;
        self.frames_sent += 1;
        Ok(Transmission {
            sent_at: Utc::now(),
            air_time: started.elapsed(),
        })
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let wait = self.receive_cap.map_or(timeout, |cap| cap.min(timeout));
        match self.rx.recv_timeout(wait) {
            Ok(frame) => Ok(Received::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(Received::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}
