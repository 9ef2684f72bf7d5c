//! Radix-85 text encoding (RFC 1924 alphabet).
//!
//! Output matches Python's `base64.b85encode` without padding: input is
//! zero-padded to a multiple of four bytes, each big-endian word becomes five
//! characters, and as many trailing characters as padding bytes are dropped.

use crate::error::{Error, Result};

const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

const INVALID: u8 = 0xFF;

const DECODE_TABLE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Encode bytes as radix-85 text.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let padding = (4 - data.len() % 4) % 4;
    let mut out = Vec::with_capacity(data.len().div_ceil(4) * 5);

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        let mut group = [0u8; 5];
        for slot in group.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.extend_from_slice(&group);
    }

    out.truncate(out.len() - padding);
    out
}

/// Decode radix-85 text.
///
/// # Errors
///
/// Returns [`Error::Alphabet`] on a character outside the alphabet or a
/// group whose value does not fit in 32 bits.
pub fn decode(text: &[u8]) -> Result<Vec<u8>> {
    let padding = (5 - text.len() % 5) % 5;
    let mut out = Vec::with_capacity(text.len().div_ceil(5) * 4);

    for (group_index, chunk) in text.chunks(5).enumerate() {
        let mut acc: u64 = 0;
        for position in 0..5 {
            let digit = match chunk.get(position) {
                Some(&c) => {
                    let d = DECODE_TABLE[c as usize];
                    if d == INVALID {
                        return Err(Error::Alphabet(format!(
                            "bad base85 character at position {}",
                            group_index * 5 + position
                        )));
                    }
                    d
                }
                None => 84,
            };
            acc = acc * 85 + u64::from(digit);
        }

        let word = u32::try_from(acc).map_err(|_| {
            Error::Alphabet(format!(
                "base85 overflow in hunk starting at byte {}",
                group_index * 5
            ))
        })?;
        out.extend_from_slice(&word.to_be_bytes());
    }

    out.truncate(out.len() - padding);
    Ok(out)
}
