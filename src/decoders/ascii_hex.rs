//! ASCIIHexDecode.
//!
//! Pairs of hex digits, whitespace ignored, `>` as end-of-data. A
//! trailing odd digit gets an implied low nibble of 0.

use crate::decoders::{is_pdf_whitespace, StreamDecoder};
use crate::error::{Error, Result};

/// ASCIIHexDecode filter.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut pending: Option<u8> = None;

        for &byte in input {
            if byte == b'>' {
                break;
            }
            if is_pdf_whitespace(byte) {
                continue;
            }

            let nibble = hex_value(byte).ok_or_else(|| {
                Error::Decode(format!("ASCIIHexDecode: '{}' is not a hex digit", byte as char))
            })?;

            match pending.take() {
                Some(high) => output.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }

        // odd digit count: the final low nibble is implicitly zero
        if let Some(high) = pending {
            output.push(high << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}
