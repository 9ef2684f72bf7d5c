//! LMODEM packet framing.
//!
//! Every frame is ASCII hex text, exactly what the radio's `radio tx`
//! command takes. The radio sends the decoded bytes over the air and the
//! receiving radio reports them back as hex again.
//!
//! ## Data Packets
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────┐
//! │  hex("NNN")          │  block payload                   │
//! │  6 hex chars         │  up to block_width hex chars     │
//! └──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! `NNN` is the zero-padded decimal block index. The payload is already hex,
//! so it is sent as-is.
//!
//! ## Control Packets
//!
//! The hex encoding of an ASCII token:
//!
//! - `READY`, `DUPLICATE_PASS`, `DUPLICATE_FAIL`, `END_OF_TRANSMISSION`,
//!   `INCOMPLETE`, `COMPLETE_PASS`, `COMPLETE_FAIL`, `COMPLETE_CODEC_FAIL`
//! - the file manifest, `name|size_on_disk|size_ota|block_count|fingerprint`
//! - a block request, `NNN` received count followed by `|`-joined missing
//!   indices, e.g. `012003|007|011`
//!
//! Parsing accepts either hex case; radios differ in what they report.

use std::fmt;

use crate::block::{Block, BlockIndex, INDEX_DIGITS, MAX_BLOCKS};
use crate::error::{Error, Result};
use crate::file::FileManifest;

/// Handshake token
pub const HANDSHAKE: &str = "READY";
/// Receiver already holds an identical file
pub const DUPLICATE_PASS: &str = "DUPLICATE_PASS";
/// Receiver holds a different file with the same name
pub const DUPLICATE_FAIL: &str = "DUPLICATE_FAIL";
/// Sender finished delivering the requested blocks
pub const END_OF_TRANSMISSION: &str = "END_OF_TRANSMISSION";
/// Receiver still misses blocks and saved a checkpoint
pub const INCOMPLETE: &str = "INCOMPLETE";
/// Receiver reconstructed and verified the file
pub const COMPLETE_PASS: &str = "COMPLETE_PASS";
/// Reconstructed file failed the fingerprint check
pub const COMPLETE_FAIL: &str = "COMPLETE_FAIL";
/// Collected blocks could not be decoded
pub const COMPLETE_CODEC_FAIL: &str = "COMPLETE_CODEC_FAIL";

const REQUEST_SEPARATOR: char = '|';

const MANIFEST_FIELDS: usize = 5;

/// Hex characters taken by the index prefix of a data packet.
pub const DATA_PREFIX_LEN: usize = INDEX_DIGITS * 2;

/// A control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Link establishment
    Handshake,
    /// Description of the file about to be sent
    Manifest(FileManifest),
    /// Blocks the receiver wants
    BlockRequest {
        /// Blocks already held by the receiver; zero means "send everything"
        received: usize,
        /// Missing indices, ascending
        missing: Vec<BlockIndex>,
    },
    /// End of a delivery run
    EndOfTransmission,
    /// Identical file already present
    DuplicatePass,
    /// Conflicting file already present
    DuplicateFail,
    /// Blocks still missing, checkpoint saved
    Incomplete,
    /// File verified
    CompletePass,
    /// Fingerprint mismatch after reconstruction
    CompleteFail,
    /// Decode failure after reconstruction
    CompleteCodecFail,
}

impl Control {
    /// Build a block request that fits in one packet.
    ///
    /// Missing indices are kept lowest first and the list is cut at an entry
    /// boundary once it would exceed `max_request_length` characters. A
    /// receiver holding nothing sends an empty list.
    #[must_use]
    pub fn block_request(received: usize, missing: &[BlockIndex], max_request_length: usize) -> Self {
        if received == 0 {
            return Self::BlockRequest {
                received: 0,
                missing: Vec::new(),
            };
        }

        let mut kept = Vec::new();
        let mut length = 0;
        for &index in missing {
            let added = if kept.is_empty() {
                INDEX_DIGITS
            } else {
                INDEX_DIGITS + 1
            };
            if length + added > max_request_length {
                break;
            }
            length += added;
            kept.push(index);
        }

        if kept.len() < missing.len() {
            tracing::debug!(
                requested = kept.len(),
                missing = missing.len(),
                "Block request truncated"
            );
        }

        Self::BlockRequest {
            received: received.min(MAX_BLOCKS),
            missing: kept,
        }
    }

    /// The ASCII text of this message, before hex encoding.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Handshake => HANDSHAKE.to_string(),
            Self::Manifest(manifest) => manifest.to_wire(),
            Self::BlockRequest { received, missing } => {
                let list: Vec<String> = missing.iter().map(ToString::to_string).collect();
                format!("{received:03}{}", list.join("|"))
            }
            Self::EndOfTransmission => END_OF_TRANSMISSION.to_string(),
            Self::DuplicatePass => DUPLICATE_PASS.to_string(),
            Self::DuplicateFail => DUPLICATE_FAIL.to_string(),
            Self::Incomplete => INCOMPLETE.to_string(),
            Self::CompletePass => COMPLETE_PASS.to_string(),
            Self::CompleteFail => COMPLETE_FAIL.to_string(),
            Self::CompleteCodecFail => COMPLETE_CODEC_FAIL.to_string(),
        }
    }

    /// Short name for logs and error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Handshake => HANDSHAKE,
            Self::Manifest(_) => "MANIFEST",
            Self::BlockRequest { .. } => "BLOCK_REQUEST",
            Self::EndOfTransmission => END_OF_TRANSMISSION,
            Self::DuplicatePass => DUPLICATE_PASS,
            Self::DuplicateFail => DUPLICATE_FAIL,
            Self::Incomplete => INCOMPLETE,
            Self::CompletePass => COMPLETE_PASS,
            Self::CompleteFail => COMPLETE_FAIL,
            Self::CompleteCodecFail => COMPLETE_CODEC_FAIL,
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that can arrive over the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// An addressed block
    Data(Block),
    /// A control message
    Control(Control),
}

/// Frame a data packet.
#[must_use]
pub fn frame_data(block: &Block) -> Vec<u8> {
    let prefix = hex::encode(block.index.to_string());
    let mut frame = Vec::with_capacity(prefix.len() + block.payload.len());
    frame.extend_from_slice(prefix.as_bytes());
    frame.extend_from_slice(block.payload.as_bytes());
    frame
}

/// Parse a data packet.
///
/// # Errors
///
/// Returns [`Error::MalformedPacket`] if the frame is shorter than the index
/// prefix, the prefix is not three hex-encoded ASCII digits, or the payload
/// is not hex.
pub fn parse_data(frame: &[u8]) -> Result<Block> {
    if frame.len() < DATA_PREFIX_LEN {
        return Err(Error::MalformedPacket(format!(
            "data frame of {} characters is shorter than its index",
            frame.len()
        )));
    }
    let (prefix, payload) = frame.split_at(DATA_PREFIX_LEN);

    let digits = hex::decode(prefix)
        .map_err(|e| Error::MalformedPacket(format!("block index prefix: {e}")))?;
    let digits = std::str::from_utf8(&digits)
        .map_err(|_| Error::MalformedPacket("block index is not ASCII".to_string()))?;
    if digits.len() != INDEX_DIGITS {
        return Err(Error::MalformedPacket(format!("block index '{digits}' is not 3 digits")));
    }
    let index: BlockIndex = digits.parse()?;

    if !payload.iter().all(u8::is_ascii_hexdigit) {
        return Err(Error::MalformedPacket(format!(
            "payload of block {index} is not hex"
        )));
    }
    let payload = String::from_utf8_lossy(payload).to_ascii_lowercase();

    Ok(Block::new(index, payload))
}

/// Frame a control packet.
#[must_use]
pub fn frame_control(control: &Control) -> Vec<u8> {
    hex::encode(control.to_text()).into_bytes()
}

/// Parse a control packet.
///
/// Fixed tokens are tried first, then the manifest, then the block request.
///
/// # Errors
///
/// Returns [`Error::MalformedPacket`] if the frame is not hex-encoded ASCII
/// or matches none of the control forms.
pub fn parse_control(frame: &[u8]) -> Result<Control> {
    let text = decode_text(frame)?;

    let fixed = match text.as_str() {
        HANDSHAKE => Some(Control::Handshake),
        DUPLICATE_PASS => Some(Control::DuplicatePass),
        DUPLICATE_FAIL => Some(Control::DuplicateFail),
        END_OF_TRANSMISSION => Some(Control::EndOfTransmission),
        INCOMPLETE => Some(Control::Incomplete),
        COMPLETE_PASS => Some(Control::CompletePass),
        COMPLETE_FAIL => Some(Control::CompleteFail),
        COMPLETE_CODEC_FAIL => Some(Control::CompleteCodecFail),
        _ => None,
    };
    if let Some(control) = fixed {
        return Ok(control);
    }

    let manifest = match FileManifest::from_wire(&text) {
        Ok(manifest) => return Ok(Control::Manifest(manifest)),
        Err(e) => e,
    };

    if let Some(request) = parse_block_request(&text) {
        return Ok(request);
    }

    // Five fields that are not a request are a manifest the parser refused.
    if text.split(REQUEST_SEPARATOR).count() == MANIFEST_FIELDS {
        return Err(manifest);
    }
    Err(Error::MalformedPacket(format!(
        "unrecognised control text '{}'",
        preview(&text)
    )))
}

/// Whether a frame carries readable control text, as opposed to noise.
#[must_use]
pub fn is_control_text(frame: &[u8]) -> bool {
    decode_text(frame).is_ok()
}

/// Parse a frame received while collecting blocks.
///
/// The end-of-transmission sentinel is matched exactly; anything else must
/// be a data packet.
///
/// # Errors
///
/// Returns [`Error::MalformedPacket`] if the frame is neither.
pub fn parse_delivery(frame: &[u8]) -> Result<Packet> {
    let sentinel = hex::encode(END_OF_TRANSMISSION);
    if frame.eq_ignore_ascii_case(sentinel.as_bytes()) {
        return Ok(Packet::Control(Control::EndOfTransmission));
    }
    parse_data(frame).map(Packet::Data)
}

fn decode_text(frame: &[u8]) -> Result<String> {
    let bytes =
        hex::decode(frame).map_err(|e| Error::MalformedPacket(format!("control frame: {e}")))?;
    if !bytes.is_ascii() {
        return Err(Error::MalformedPacket("control text is not ASCII".to_string()));
    }
    String::from_utf8(bytes).map_err(|_| Error::MalformedPacket("control text is not ASCII".to_string()))
}

fn parse_block_request(text: &str) -> Option<Control> {
    let count = text.get(..INDEX_DIGITS)?;
    if !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let received = count.parse().ok()?;

    let rest = &text[INDEX_DIGITS..];
    let missing = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(REQUEST_SEPARATOR)
            .map(|entry| {
                if entry.len() == INDEX_DIGITS {
                    entry.parse::<BlockIndex>().ok()
                } else {
                    None
                }
            })
            .collect::<Option<Vec<_>>>()?
    };

    Some(Control::BlockRequest { received, missing })
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 40;
    if text.len() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Fingerprint;

    fn idx(n: usize) -> BlockIndex {
        BlockIndex::new(n).unwrap()
    }

    #[test]
    fn test_data_frame_layout() {
        let block = Block::new(idx(7), "abcdef".to_string());
        assert_eq!(frame_data(&block), b"303037abcdef");
    }

    #[test]
    fn test_data_frame_roundtrip_edges() {
        for n in [0, 1, 9, 10, 99, 100, 500, 998] {
            let block = Block::new(idx(n), "00ff".repeat(32));
            assert_eq!(parse_data(&frame_data(&block)).unwrap(), block);
        }
    }

    #[test]
    fn test_parse_data_accepts_uppercase() {
        let block = parse_data(b"303132ABCDEF").unwrap();
        assert_eq!(block.index.get(), 12);
        assert_eq!(block.payload, "abcdef");
    }

    #[test]
    fn test_parse_data_rejects_malformed() {
        let cases: [&[u8]; 5] = [
            b"3030",
            b"zz3030abcd",
            b"414243abcd",
            b"303030abxz",
            b"393939abcd",
        ];
        for bad in cases {
            assert!(
                matches!(parse_data(bad), Err(Error::MalformedPacket(_))),
                "{} should be rejected",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn test_control_tokens_hex_encoded() {
        assert_eq!(frame_control(&Control::Handshake), b"5245414459");
        assert_eq!(
            frame_control(&Control::EndOfTransmission),
            b"454e445f4f465f5452414e534d495353494f4e"
        );
    }

    #[test]
    fn test_fixed_tokens_roundtrip() {
        for control in [
            Control::Handshake,
            Control::EndOfTransmission,
            Control::DuplicatePass,
            Control::DuplicateFail,
            Control::Incomplete,
            Control::CompletePass,
            Control::CompleteFail,
            Control::CompleteCodecFail,
        ] {
            assert_eq!(parse_control(&frame_control(&control)).unwrap(), control);
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = FileManifest {
            name: "map.png".to_string(),
            size_on_disk: 8000,
            size_ota: 7100,
            block_count: 56,
            fingerprint: Fingerprint::of_bytes(b"map"),
        };
        let control = Control::Manifest(manifest);
        assert_eq!(parse_control(&frame_control(&control)).unwrap(), control);
    }

    #[test]
    fn test_block_request_text() {
        let request = Control::BlockRequest {
            received: 12,
            missing: vec![idx(3), idx(7), idx(11)],
        };
        assert_eq!(request.to_text(), "012003|007|011");
        assert_eq!(parse_control(&frame_control(&request)).unwrap(), request);
    }

    #[test]
    fn test_fresh_request_has_empty_list() {
        let request = Control::block_request(0, &[idx(0), idx(1)], 127);
        assert_eq!(request.to_text(), "000");
        assert_eq!(parse_control(&frame_control(&request)).unwrap(), request);
    }

    #[test]
    fn test_five_entry_request_is_not_a_manifest() {
        let request = Control::BlockRequest {
            received: 5,
            missing: (0..5).map(idx).collect(),
        };
        assert_eq!(request.to_text(), "005000|001|002|003|004");
        assert_eq!(parse_control(&frame_control(&request)).unwrap(), request);
    }

    #[test]
    fn test_block_request_truncates_at_entry_boundary() {
        let missing: Vec<BlockIndex> = (0..100).map(idx).collect();
        let Control::BlockRequest { missing: kept, .. } = Control::block_request(5, &missing, 127)
        else {
            panic!("expected a block request");
        };
        // 32 entries take 32 * 3 + 31 = 127 characters.
        assert_eq!(kept.len(), 32);
        assert_eq!(kept[0].get(), 0);
        assert_eq!(kept[31].get(), 31);

        let Control::BlockRequest { missing: kept, .. } = Control::block_request(5, &missing, 63)
        else {
            panic!("expected a block request");
        };
        assert_eq!(kept.len(), 16);
    }

    #[test]
    fn test_block_request_text_fits_limit() {
        let missing: Vec<BlockIndex> = (0..998).step_by(3).map(idx).collect();
        for limit in [3, 10, 63, 127] {
            let request = Control::block_request(100, &missing, limit);
            assert!(request.to_text().len() - INDEX_DIGITS <= limit);
        }
    }

    #[test]
    fn test_parse_control_rejects_unknown() {
        let frame = hex::encode("HELLO").into_bytes();
        assert!(matches!(parse_control(&frame), Err(Error::MalformedPacket(_))));
        assert!(matches!(parse_control(b"xyz"), Err(Error::MalformedPacket(_))));
        let frame = hex::encode("01201|7").into_bytes();
        assert!(matches!(parse_control(&frame), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_parse_control_reports_refused_manifest() {
        let fp = Fingerprint::of_bytes(b"x");
        let frame = hex::encode(format!("x.bin|1|1|1000|{fp}")).into_bytes();
        match parse_control(&frame) {
            Err(Error::MalformedPacket(msg)) => assert!(msg.contains("block count"), "{msg}"),
            other => panic!("expected a refused manifest, got {other:?}"),
        }

        // A five-entry request also has five fields.
        let frame = hex::encode("004001|002|003|005|006").into_bytes();
        assert!(matches!(
            parse_control(&frame),
            Ok(Control::BlockRequest { received: 4, .. })
        ));
    }

    #[test]
    fn test_is_control_text() {
        assert!(is_control_text(&frame_control(&Control::Incomplete)));
        assert!(is_control_text(hex::encode("x.bin|1|1|0|ab").as_bytes()));
        assert!(!is_control_text(b"xyz"));
        assert!(!is_control_text(b"ff80"));
    }

    #[test]
    fn test_parse_delivery() {
        let eot = frame_control(&Control::EndOfTransmission);
        assert_eq!(
            parse_delivery(&eot).unwrap(),
            Packet::Control(Control::EndOfTransmission)
        );
        assert_eq!(
            parse_delivery(&eot.to_ascii_uppercase()).unwrap(),
            Packet::Control(Control::EndOfTransmission)
        );

        let block = Block::new(idx(42), "beef".to_string());
        assert_eq!(
            parse_delivery(&frame_data(&block)).unwrap(),
            Packet::Data(block)
        );
        assert!(parse_delivery(&frame_control(&Control::Handshake)).is_err());
    }
}
