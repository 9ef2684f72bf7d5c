//! Common test utilities for LMODEM integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use lmodem_core::block::Block;
use lmodem_core::profile::{resolve_channel, resolve_mode, Channel, Profile};
use lmodem_core::protocol::{self, Control, Packet};
use lmodem_core::session::CancelToken;
use lmodem_core::transport::{
    configure, AppliedParams, LinkQuality, MemoryTransport, Received, Transmission, Transport,
    TransportError,
};

/// Bound on every in-memory receive so watchdog waits stay short.
pub const RECEIVE_CAP: Duration = Duration::from_millis(200);

/// Random input of this size encodes to three mode 1 blocks.
pub const THREE_BLOCK_SIZE: usize = 230;

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Mode and channel used by the session tests.
pub fn test_profile() -> (Profile, Channel) {
    (resolve_mode(1).unwrap(), resolve_channel(1).unwrap())
}

/// A configured in-memory pair with short receive waits.
pub fn radio_pair() -> (MemoryTransport, MemoryTransport) {
    let (profile, channel) = test_profile();
    let (a, b) = MemoryTransport::pair();
    let mut a = a.with_receive_cap(RECEIVE_CAP);
    let mut b = b.with_receive_cap(RECEIVE_CAP);
    configure(&mut a, &profile, &channel).unwrap();
    configure(&mut b, &profile, &channel).unwrap();
    (a, b)
}

/// Decide what a frame classifies as, from the receiving side's point of view.
pub fn classify(frame: &[u8]) -> Packet {
    if let Ok(control) = protocol::parse_control(frame) {
        return Packet::Control(control);
    }
    protocol::parse_delivery(frame).expect("frame is neither control nor data")
}

/// Count data frames in a transmit log.
pub fn data_frames(log: &Arc<Mutex<Vec<Vec<u8>>>>) -> Vec<Block> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|frame| match classify(frame) {
            Packet::Data(block) => Some(block),
            Packet::Control(_) => None,
        })
        .collect()
}

/// Control packets in a transmit log.
pub fn control_frames(log: &Arc<Mutex<Vec<Vec<u8>>>>) -> Vec<Control> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|frame| match classify(frame) {
            Packet::Control(control) => Some(control),
            Packet::Data(_) => None,
        })
        .collect()
}

type Filter = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// Transport wrapper that records every transmitted frame and may drop or
/// rewrite it before it reaches the air.
pub struct Tap<T> {
    inner: T,
    log: Arc<Mutex<Vec<Vec<u8>>>>,
    filter: Filter,
}

impl<T> Tap<T> {
    /// Record frames without altering them.
    pub fn new(inner: T) -> Self {
        Self::with_filter(inner, |frame| Some(frame.to_vec()))
    }

    /// Record frames and pass each through `filter`; `None` drops it.
    pub fn with_filter<F>(inner: T, filter: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
            filter: Box::new(filter),
        }
    }

    /// Frames handed to `transmit`, before filtering.
    pub fn log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.log)
    }
}

impl<T: Transport> Transport for Tap<T> {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        self.inner.apply_profile(profile, channel)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        self.inner.applied_params()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        self.log.lock().unwrap().push(frame.to_vec());
        match (self.filter)(frame) {
            Some(frame) => self.inner.transmit(&frame),
            None => Ok(Transmission {
                sent_at: Utc::now(),
                air_time: Duration::ZERO,
            }),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        self.inner.receive(timeout)
    }

    fn link_quality(&mut self) -> Option<LinkQuality> {
        self.inner.link_quality()
    }
}

/// Transport wrapper that cancels a session after it has received a number
/// of data frames.
pub struct CancelAfterData<T> {
    inner: T,
    token: CancelToken,
    remaining: usize,
}

impl<T> CancelAfterData<T> {
    /// Cancel `token` once `count` data frames have arrived.
    pub fn new(inner: T, token: CancelToken, count: usize) -> Self {
        Self {
            inner,
            token,
            remaining: count,
        }
    }
}

impl<T: Transport> Transport for CancelAfterData<T> {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        self.inner.apply_profile(profile, channel)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        self.inner.applied_params()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        self.inner.transmit(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let received = self.inner.receive(timeout)?;
        if let Received::Frame(frame) = &received {
            if matches!(protocol::parse_delivery(frame), Ok(Packet::Data(_))) {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.token.cancel();
                }
            }
        }
        Ok(received)
    }
}

/// Alter one radix-85 character inside `block` so the file still decodes
/// but to different bytes.
///
/// The character chosen is the last digit of a five-character group, so the
/// group's value moves by one and only its final byte changes.
pub fn corrupt_block(block: &Block, block_width: usize) -> Block {
    const ALPHABET: &[u8] =
        b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

    let start = block.index.get() * block_width;
    let offset = (0..block.payload.len())
        .step_by(2)
        .find(|o| ((start + o) / 2) % 5 == 4)
        .expect("block holds a full group");

    let mut chars = hex::decode(&block.payload).expect("payload is hex");
    let position = offset / 2;
    let digit = ALPHABET
        .iter()
        .position(|&c| c == chars[position])
        .expect("payload is radix-85");
    let replaced = if digit > 0 { digit - 1 } else { digit + 1 };
    chars[position] = ALPHABET[replaced];

    Block::new(block.index, hex::encode(chars))
}

/// Transport wrapper that reports a fixed signal quality and counts how
/// often it is asked.
pub struct SignalMeter<T> {
    inner: T,
    queries: Arc<AtomicUsize>,
}

impl<T> SignalMeter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn queries(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.queries)
    }
}

impl<T: Transport> Transport for SignalMeter<T> {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        self.inner.apply_profile(profile, channel)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        self.inner.applied_params()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        self.inner.transmit(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        self.inner.receive(timeout)
    }

    fn link_quality(&mut self) -> Option<LinkQuality> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Some(LinkQuality { rssi: -80, snr: 7 })
    }
}

/// Number of link-quality queries recorded so far.
pub fn query_count(queries: &Arc<AtomicUsize>) -> usize {
    queries.load(Ordering::SeqCst)
}
