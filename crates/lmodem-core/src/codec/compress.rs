//! Zstd compression stage.
//!
//! This module wraps the zstd library for compressing a whole file before it
//! is text-encoded for the radio link.

use std::io::{Cursor, Write};

use crate::error::{Error, Result};

/// Compression level used for every outgoing file.
///
/// Files are small and air time is expensive, so we trade CPU for ratio.
pub const COMPRESSION_LEVEL: i32 = 19;

/// Compress data using zstd.
///
/// The frame carries no content checksum; end-to-end integrity is the
/// fingerprint comparison after reconstruction.
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut encoder = zstd::stream::Encoder::new(Vec::new(), level)
        .map_err(|e| Error::Codec(format!("zstd encoder setup failed: {e}")))?;
    encoder
        .include_checksum(false)
        .map_err(|e| Error::Codec(format!("zstd encoder setup failed: {e}")))?;
    encoder
        .write_all(data)
        .map_err(|e| Error::Codec(format!("zstd compress failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Codec(format!("zstd compress failed: {e}")))
}

/// Decompress zstd data.
///
/// # Errors
///
/// Returns [`Error::Codec`] if decompression fails.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let cursor = Cursor::new(data);
    zstd::stream::decode_all(cursor)
        .map_err(|e| Error::Codec(format!("zstd decompress failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress_roundtrip() {
        let original = b"Hello, this is test data that should compress well. ".repeat(100);
        let compressed = compress(&original, COMPRESSION_LEVEL).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn test_compress_empty() {
        let compressed = compress(b"", COMPRESSION_LEVEL).unwrap();
        assert!(!compressed.is_empty(), "empty input still produces a frame");
        let decompressed = decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn test_compression_ratio_text() {
        let text = b"Repetitive text that compresses well. ".repeat(1000);
        let compressed = compress(&text, COMPRESSION_LEVEL).unwrap();
        let ratio = compressed.len() as f64 / text.len() as f64;
        assert!(ratio < 0.5, "Text should compress to <50% of original");
    }

    #[test]
    fn test_decompress_invalid_data() {
        let invalid = b"this is not valid zstd data";
        let result = decompress(invalid);
        assert!(matches!(result, Err(Error::Codec(_))));
    }
}
