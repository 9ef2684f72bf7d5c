//! File encoding pipeline.
//!
//! Outgoing files pass through four stages:
//!
//! ```text
//! file bytes ─▶ zstd ─▶ radix-85 ─▶ hex ─▶ block_width chunks
//! ```
//!
//! The radix-85 text length is the *over-the-air size* checked against the
//! mode's limit. Hex encoding keeps the block alphabet to `[0-9a-f]`, which
//! the radio's `radio tx` command accepts verbatim.
//!
//! Decoding runs the stages in reverse and never panics on bad input: hex and
//! radix-85 failures surface as [`Error::Alphabet`], decompression failures as
//! [`Error::Codec`].

pub mod base85;
mod compress;

pub use compress::{compress, decompress, COMPRESSION_LEVEL};

use crate::block::{Block, BlockIndex, MAX_BLOCKS};
use crate::error::{Error, Result};
use crate::profile::Profile;

/// A file encoded for a particular mode.
#[derive(Debug, Clone)]
pub struct EncodedFile {
    /// Blocks in index order
    pub blocks: Vec<Block>,
    /// Radix-85 text length in bytes
    pub ota_size: usize,
}

impl EncodedFile {
    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Look up a block by index.
    #[must_use]
    pub fn block(&self, index: BlockIndex) -> Option<&Block> {
        self.blocks.get(index.get())
    }
}

/// Encode file bytes into blocks for `profile`.
///
/// # Errors
///
/// Returns [`Error::OtaSizeExceeded`] if the radix-85 text is larger than the
/// mode allows, or [`Error::TooManyBlocks`] if the hex text needs more blocks
/// than the index can address.
pub fn encode(data: &[u8], profile: &Profile) -> Result<EncodedFile> {
    let compressed = compress(data, COMPRESSION_LEVEL)?;
    let text = base85::encode(&compressed);

    let ota_size = text.len();
    if ota_size > profile.max_ota_size {
        return Err(Error::OtaSizeExceeded {
            size: ota_size,
            max: profile.max_ota_size,
            mode: profile.id,
        });
    }

    let hex_text = hex::encode(&text);
    let count = hex_text.len().div_ceil(profile.block_width);
    if count > MAX_BLOCKS {
        return Err(Error::TooManyBlocks {
            count,
            limit: MAX_BLOCKS,
        });
    }

    let blocks = hex_text
        .as_bytes()
        .chunks(profile.block_width)
        .zip(BlockIndex::range(count))
        .map(|(chunk, index)| {
            // hex output is pure ASCII, so every chunk boundary is a char boundary
            Block::new(index, String::from_utf8_lossy(chunk).into_owned())
        })
        .collect();

    tracing::debug!(
        raw = data.len(),
        compressed = compressed.len(),
        ota = ota_size,
        blocks = count,
        mode = profile.id,
        "Encoded file"
    );

    Ok(EncodedFile { blocks, ota_size })
}

/// Reassemble file bytes from blocks.
///
/// Blocks are sorted by index before concatenation. Every block except the
/// last must be exactly `block_width` characters wide.
///
/// # Errors
///
/// Returns [`Error::Alphabet`] if the text is not valid hex or radix-85, and
/// [`Error::Codec`] if decompression fails.
pub fn decode(blocks: &[Block], profile: &Profile) -> Result<Vec<u8>> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.index);

    let last = ordered.len().saturating_sub(1);
    let mut hex_text = String::with_capacity(ordered.len() * profile.block_width);
    for (position, block) in ordered.iter().enumerate() {
        if position != last && block.payload.len() != profile.block_width {
            return Err(Error::Alphabet(format!(
                "block {} is {} characters wide, expected {}",
                block.index,
                block.payload.len(),
                profile.block_width
            )));
        }
        hex_text.push_str(&block.payload);
    }

    let text = hex::decode(&hex_text).map_err(|e| Error::Alphabet(format!("hex: {e}")))?;
    let compressed = base85::decode(&text)?;
    decompress(&compressed)
}
