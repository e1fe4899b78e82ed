//! ASCII85Decode.
//!
//! Groups of five characters in `!`..`u` encode four bytes base-85.
//! `z` is shorthand for four zero bytes, `~` starts the `~>` terminator,
//! and a final short group of n characters yields n-1 bytes.

use crate::decoders::{is_pdf_whitespace, StreamDecoder};
use crate::error::{Error, Result};

/// ASCII85Decode filter.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut filled = 0;

        for &byte in input {
            match byte {
                b'~' => break,
                b'z' if filled == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return Err(Error::Decode(
                        "ASCII85Decode: 'z' inside a group".to_string(),
                    ));
                },
                b'!'..=b'u' => {
                    group[filled] = byte - b'!';
                    filled += 1;
                    if filled == 5 {
                        output.extend_from_slice(&expand_group(&group)?);
                        filled = 0;
                    }
                },
                b if is_pdf_whitespace(b) => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid byte 0x{:02x}",
                        other
                    )));
                },
            }
        }

        match filled {
            0 => {},
            1 => {
                return Err(Error::Decode(
                    "ASCII85Decode: a final group of one character is meaningless".to_string(),
                ));
            },
            n => {
                // pad with the highest digit and keep n-1 output bytes
                for slot in group.iter_mut().skip(n) {
                    *slot = 84;
                }
                let bytes = expand_group(&group)?;
                output.extend_from_slice(&bytes[..n - 1]);
            },
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

/// Turn five base-85 digits into four bytes.
fn expand_group(digits: &[u8; 5]) -> Result<[u8; 4]> {
    let mut acc: u64 = 0;
    for &d in digits {
        acc = acc * 85 + d as u64;
    }
    if acc > u32::MAX as u64 {
        return Err(Error::Decode("ASCII85Decode: group value exceeds 2^32".to_string()));
    }
    Ok((acc as u32).to_be_bytes())
}
