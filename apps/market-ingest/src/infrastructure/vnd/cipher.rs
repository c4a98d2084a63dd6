//! Frame Cipher
//!
//! The feed shifts each character by its position: the character at
//! zero-based index `i` is stored as `c - (i % 5)`. Decoding adds the shift
//! back. Positions count characters, not bytes.

use crate::domain::DecodeError;

const PERIOD: usize = 5;

#[allow(clippy::cast_possible_truncation)]
const fn shift(i: usize) -> u32 {
    (i % PERIOD) as u32
}

/// Reverse the positional shift.
///
/// # Errors
///
/// Returns `DecodeError::MalformedFrame` if a shifted code point is not a
/// valid character.
pub fn decode(encoded: &str) -> Result<String, DecodeError> {
    encoded
        .chars()
        .enumerate()
        .map(|(i, c)| {
            char::from_u32(u32::from(c) + shift(i))
                .ok_or_else(|| DecodeError::MalformedFrame(format!("invalid code point at {i}")))
        })
        .collect()
}

/// Apply the positional shift.
///
/// # Errors
///
/// Returns `DecodeError::MalformedFrame` if a shifted code point is not a
/// valid character.
pub fn encode(plain: &str) -> Result<String, DecodeError> {
    plain
        .chars()
        .enumerate()
        .map(|(i, c)| {
            u32::from(c)
                .checked_sub(shift(i))
                .and_then(char::from_u32)
                .ok_or_else(|| DecodeError::MalformedFrame(format!("invalid code point at {i}")))
        })
        .collect()
}
