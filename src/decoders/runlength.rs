//! RunLengthDecode.
//!
//! One control byte per run: 0..=127 copies the next n+1 bytes, 128 is
//! end-of-data, 129..=255 repeats the next byte 257-n times.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// RunLengthDecode filter.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut rest = input;

        while let Some((&control, tail)) = rest.split_first() {
            match control {
                128 => break,
                0..=127 => {
                    let count = control as usize + 1;
                    if tail.len() < count {
                        return Err(Error::Decode(format!(
                            "RunLengthDecode: literal run of {} bytes but only {} remain",
                            count,
                            tail.len()
                        )));
                    }
                    output.extend_from_slice(&tail[..count]);
                    rest = &tail[count..];
                },
                _ => {
                    let count = 257 - control as usize;
                    let (&value, tail) = tail.split_first().ok_or_else(|| {
                        Error::Decode("RunLengthDecode: repeat run missing its byte".to_string())
                    })?;
                    output.resize(output.len() + count, value);
                    rest = tail;
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_run() {
        assert_eq!(RunLengthDecoder.decode(&[4, b'H', b'e', b'l', b'l', b'o']).unwrap(), b"Hello");
    }

    #[test]
    fn test_repeat_run() {
        assert_eq!(RunLengthDecoder.decode(&[252, b'A']).unwrap(), b"AAAAA");
    }

    #[test]
    fn test_mixed_runs() {
        assert_eq!(RunLengthDecoder.decode(&[1, b'H', b'i', 254, b'X']).unwrap(), b"HiXXX");
    }

    #[test]
    fn test_eod_stops_decoding() {
        assert_eq!(RunLengthDecoder.decode(&[1, b'H', b'i', 128, 99, 99]).unwrap(), b"Hi");
    }

    #[test]
    fn test_longest_runs() {
        let mut literal = vec![127];
        literal.extend_from_slice(&[b'A'; 128]);
        assert_eq!(RunLengthDecoder.decode(&literal).unwrap(), vec![b'A'; 128]);

        assert_eq!(RunLengthDecoder.decode(&[129, b'B']).unwrap(), vec![b'B'; 128]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(RunLengthDecoder.decode(&[]).unwrap(), b"");
    }

    #[test]
    fn test_truncated_literal_run() {
        assert!(RunLengthDecoder.decode(&[4, b'A', b'B']).is_err());
    }

    #[test]
    fn test_repeat_without_byte() {
        assert!(RunLengthDecoder.decode(&[252]).is_err());
    }

    #[test]
    fn test_name() {
        assert_eq!(RunLengthDecoder.name(), "RunLengthDecode");
    }
}
