//! Block addressing.
//!
//! A block is a fixed-width slice of the fully encoded file. Its index is
//! carried on the wire as three ASCII decimal digits, which caps a transfer
//! at [`MAX_BLOCKS`] blocks.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Highest block count a single transfer may use.
pub const MAX_BLOCKS: usize = 999;

/// Width of a serialized block index.
pub const INDEX_DIGITS: usize = 3;

/// Position of a block within a transfer. Always below [`MAX_BLOCKS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(u16);

impl BlockIndex {
    /// Create an index, rejecting values the wire format cannot carry.
    #[must_use]
    pub fn new(value: usize) -> Option<Self> {
        if value < MAX_BLOCKS {
            u16::try_from(value).ok().map(Self)
        } else {
            None
        }
    }

    /// The index as a `usize` for slice access.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Iterate over the first `count` indices in order.
    pub fn range(count: usize) -> impl Iterator<Item = Self> {
        (0..count.min(MAX_BLOCKS)).filter_map(Self::new)
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl FromStr for BlockIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::MalformedPacket(format!("invalid block index '{s}'")));
        }
        s.parse::<usize>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::MalformedPacket(format!("block index '{s}' out of range")))
    }
}

/// One addressable slice of the encoded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position in the transfer
    pub index: BlockIndex,
    /// Hex characters of the encoded file
    pub payload: String,
}

impl Block {
    /// Create a block.
    #[must_use]
    pub const fn new(index: BlockIndex, payload: String) -> Self {
        Self { index, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_bounds() {
        assert!(BlockIndex::new(0).is_some());
        assert!(BlockIndex::new(998).is_some());
        assert!(BlockIndex::new(999).is_none());
        assert!(BlockIndex::new(usize::MAX).is_none());
    }

    #[test]
    fn test_index_display_is_zero_padded() {
        assert_eq!(BlockIndex::new(7).unwrap().to_string(), "007");
        assert_eq!(BlockIndex::new(42).unwrap().to_string(), "042");
        assert_eq!(BlockIndex::new(998).unwrap().to_string(), "998");
    }

    #[test]
    fn test_index_parse() {
        assert_eq!("005".parse::<BlockIndex>().unwrap().get(), 5);
        assert_eq!("5".parse::<BlockIndex>().unwrap().get(), 5);
        assert!("999".parse::<BlockIndex>().is_err());
        assert!("-1".parse::<BlockIndex>().is_err());
        assert!("".parse::<BlockIndex>().is_err());
        assert!("1a".parse::<BlockIndex>().is_err());
    }

    #[test]
    fn test_range() {
        let indices: Vec<usize> = BlockIndex::range(4).map(BlockIndex::get).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(BlockIndex::range(5000).count(), MAX_BLOCKS);
    }
}
