//! # Hex Helpers
//!
//! Hex conversion for frame dumps and for the hex arguments accepted by the
//! command line tool. Built on the `hex` crate.
//!
//! ```rust
//! use d7a_phy::util::hex::{decode_hex, encode_hex};
//!
//! let bytes = decode_hex("0x38 0a").unwrap();
//! assert_eq!(bytes, [0x38, 0x0A]);
//! assert_eq!(encode_hex(&bytes), "380a");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string.
///
/// An optional `0x` prefix is stripped, as are whitespace and the `:`/`-`
/// separators.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Format as "38 0a 01" for log lines.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-line dump with offsets, hex and ASCII columns.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let width = bytes_per_line.max(1);
    data.chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            format!(
                "{:04x}: {:<pad$} |{}|",
                i * width,
                format_hex_compact(chunk),
                ascii,
                pad = width * 3 - 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_separators_and_prefix() {
        assert_eq!(decode_hex("0x3800").unwrap(), vec![0x38, 0x00]);
        assert_eq!(decode_hex("38:00-FF 01").unwrap(), vec![0x38, 0x00, 0xFF, 0x01]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_hex(""), Err(HexError::EmptyString));
        assert_eq!(decode_hex("0x"), Err(HexError::EmptyString));
        assert_eq!(decode_hex("123"), Err(HexError::OddLength(3)));
        assert!(matches!(decode_hex("GG"), Err(HexError::DecodeError(_))));
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex_compact(&[0x38, 0x0A]), "38 0a");
        assert_eq!(encode_hex(&[0xAB, 0xCD]), "abcd");
    }

    #[test]
    fn test_pretty_hex() {
        let dump = pretty_hex(b"D7A\x00\x01", 4);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0000: 44 37 41 00 |D7A.|");
        assert_eq!(lines[1], "0004: 01          |.|");
    }
}
