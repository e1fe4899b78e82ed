//! FlateDecode: zlib/deflate streams.
//!
//! The workhorse filter. Real-world files carry enough mangled zlib data
//! that a single decoder is not sufficient; decoding walks a chain of
//! progressively more forgiving attempts before giving up. Encoding is
//! also provided here for the rewrite path.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use inflate::inflate_bytes_zlib;
use libflate::zlib::Decoder as LibflateDecoder;
use std::io::{Read, Write};

/// FlateDecode filter.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        // Honest attempt first. A truncated stream that yielded output is
        // kept: the bytes up to the corruption point are real data.
        let (output, err) = drain(ZlibDecoder::new(input));
        let zlib_err = match err {
            None => return Ok(output),
            Some(e) if !output.is_empty() => {
                log::warn!(
                    "zlib stream truncated after {} decoded bytes, keeping them: {}",
                    output.len(),
                    e
                );
                return Ok(output);
            },
            Some(e) => e,
        };

        log::debug!("zlib decode failed ({}), trying recovery paths", zlib_err);

        // Some writers emit raw deflate with no zlib wrapper.
        if let Some(output) = drain_clean(DeflateDecoder::new(input)) {
            log::info!("recovered {} bytes as raw deflate", output.len());
            return Ok(output);
        }

        // Or a wrapper whose two header bytes are garbage.
        if input.len() > 2 {
            if let Some(output) = drain_clean(DeflateDecoder::new(&input[2..])) {
                log::info!("recovered {} bytes as deflate behind a bad header", output.len());
                return Ok(output);
            }
        }

        // A header whose compression-method nibble is wrong but whose
        // deflate payload is intact: patch CM to 8 and retry.
        if let Some(output) = retry_with_patched_header(input) {
            return Ok(output);
        }

        // Two independent zlib implementations recover some corruptions
        // that flate2 rejects outright.
        if let Ok(output) = inflate_bytes_zlib(input) {
            log::info!("inflate crate recovered {} bytes", output.len());
            return Ok(output);
        }
        if let Ok(decoder) = LibflateDecoder::new(input) {
            if let Some(output) = drain_clean(decoder) {
                log::info!("libflate recovered {} bytes", output.len());
                return Ok(output);
            }
        }

        Err(Error::Decode(format!(
            "FlateDecode data does not decompress ({} input bytes): {}",
            input.len(),
            zlib_err
        )))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress data as a zlib stream. `level` is clamped to 1..=9.
pub fn flate_encode(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let level = level.clamp(1, 9);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Read a decoder to the end, returning whatever came out plus the error
/// that stopped it, if any.
fn drain<R: Read>(mut reader: R) -> (Vec<u8>, Option<std::io::Error>) {
    let mut output = Vec::new();
    match reader.read_to_end(&mut output) {
        Ok(_) => (output, None),
        Err(e) => (output, Some(e)),
    }
}

/// Like [`drain`], but only accepts a clean, non-empty run. Recovery
/// attempts must fully succeed; partial output from a guessed framing is
/// more likely garbage than data.
fn drain_clean<R: Read>(reader: R) -> Option<Vec<u8>> {
    match drain(reader) {
        (output, None) if !output.is_empty() => Some(output),
        _ => None,
    }
}

fn retry_with_patched_header(input: &[u8]) -> Option<Vec<u8>> {
    if input.len() < 2 || input[0] & 0x0F == 8 {
        return None;
    }

    let mut patched = input.to_vec();
    patched[0] = (patched[0] & 0xF0) | 0x08;

    let output = drain_clean(ZlibDecoder::new(&patched[..]))?;
    log::info!(
        "recovered {} bytes after patching zlib compression method (was 0x{:02x})",
        output.len(),
        input[0]
    );
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        flate_encode(data, 6).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let original = b"Hello, FlateDecode!";
        assert_eq!(FlateDecoder.decode(&compress(original)).unwrap(), original);
    }

    #[test]
    fn test_roundtrip_empty() {
        assert_eq!(FlateDecoder.decode(&compress(b"")).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_large() {
        let original = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ".repeat(1000);
        assert_eq!(FlateDecoder.decode(&compress(&original)).unwrap(), original);
    }

    #[test]
    fn test_raw_deflate_without_wrapper() {
        use flate2::write::DeflateEncoder;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"naked deflate payload").unwrap();
        let raw = encoder.finish().unwrap();

        assert_eq!(FlateDecoder.decode(&raw).unwrap(), b"naked deflate payload");
    }

    #[test]
    fn test_patched_header_recovery() {
        let mut data = compress(b"patchable content");
        // break the compression-method nibble
        data[0] = (data[0] & 0xF0) | 0x03;
        assert_eq!(FlateDecoder.decode(&data).unwrap(), b"patchable content");
    }

    #[test]
    fn test_truncated_stream_keeps_prefix() {
        let full = compress(&b"0123456789".repeat(200));
        let truncated = &full[..full.len() - 6];

        let decoded = FlateDecoder.decode(truncated).unwrap();
        assert!(!decoded.is_empty());
        assert!(decoded.starts_with(b"0123456789"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(FlateDecoder.decode(b"This is not compressed data at all").is_err());
    }

    #[test]
    fn test_encode_levels_clamped() {
        let data = b"xyz".repeat(50);
        assert!(flate_encode(&data, 0).is_ok());
        assert!(flate_encode(&data, 99).is_ok());
    }

    #[test]
    fn test_name() {
        assert_eq!(FlateDecoder.name(), "FlateDecode");
    }
}
