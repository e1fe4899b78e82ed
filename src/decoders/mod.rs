//! Stream filter implementations.
//!
//! PDF stream data passes through a pipeline of named filters. The ones
//! implemented here cover what document rewriting actually encounters:
//!
//! - `FlateDecode` (zlib/deflate, the common case)
//! - `LZWDecode`
//! - `ASCIIHexDecode` / `ASCII85Decode`
//! - `RunLengthDecode`
//! - `DCTDecode` (pass-through: JPEG payloads are consumed as JPEG)
//! - PNG and TIFF predictors via `/DecodeParms`
//!
//! Filters can be chained; decoding applies them in order and then
//! reverses any predictor.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::{flate_encode, FlateDecoder};
pub use lzw::LzwDecoder;
pub use predictor::{decode_predictor, DecodeParams};
pub use runlength::RunLengthDecoder;

// Decompression caps. The ratio check only fires once output is large
// enough to matter, since tiny streams legitimately expand a lot.
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;
const MAX_EXPANSION_RATIO: u64 = 10_000;
const RATIO_CHECK_FLOOR: usize = 1024 * 1024;

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE.
pub(crate) fn is_pdf_whitespace(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// A recognized stream filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// zlib/deflate compression
    Flate,
    /// Hexadecimal encoding
    AsciiHex,
    /// Base-85 encoding
    Ascii85,
    /// Lempel-Ziv-Welch compression
    Lzw,
    /// Byte-oriented run-length encoding
    RunLength,
    /// JPEG; payload stays compressed and is handed to image code as-is
    Dct,
}

impl Filter {
    /// Resolve a filter name, accepting the inline-image abbreviations
    /// (`/Fl`, `/AHx`, `/A85`, `/LZW`, `/RL`, `/DCT`).
    pub fn from_name(name: &str) -> Option<Filter> {
        match name {
            "FlateDecode" | "Fl" => Some(Filter::Flate),
            "ASCIIHexDecode" | "AHx" => Some(Filter::AsciiHex),
            "ASCII85Decode" | "A85" => Some(Filter::Ascii85),
            "LZWDecode" | "LZW" => Some(Filter::Lzw),
            "RunLengthDecode" | "RL" => Some(Filter::RunLength),
            "DCTDecode" | "DCT" => Some(Filter::Dct),
            _ => None,
        }
    }

    fn decoder(self) -> Box<dyn StreamDecoder> {
        match self {
            Filter::Flate => Box::new(FlateDecoder),
            Filter::AsciiHex => Box::new(AsciiHexDecoder),
            Filter::Ascii85 => Box::new(Ascii85Decoder),
            Filter::Lzw => Box::new(LzwDecoder),
            Filter::RunLength => Box::new(RunLengthDecoder),
            Filter::Dct => Box::new(DctDecoder),
        }
    }
}

/// Decoder for one filter algorithm.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in stream dictionaries.
    fn name(&self) -> &str;
}

/// Pass-through for `/DCTDecode`.
///
/// JPEG payloads are never unpacked here; image handling consumes them
/// directly and the writer embeds them untouched.
pub struct DctDecoder;

impl StreamDecoder for DctDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn name(&self) -> &str {
        "DCTDecode"
    }
}

/// Run data through a filter pipeline.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}

/// Run data through a filter pipeline, then reverse any predictor.
///
/// Unknown filter names fail with [`Error::UnsupportedFilter`]. Output
/// growth is capped after every stage so a hostile stream cannot balloon
/// memory.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let input_size = data.len().max(1);
    let mut current = data.to_vec();

    for filter_name in filters {
        let filter = Filter::from_name(filter_name)
            .ok_or_else(|| Error::UnsupportedFilter(filter_name.clone()))?;

        current = filter.decoder().decode(&current)?;

        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "decoded stream of {} bytes exceeds the {} byte cap",
                current.len(),
                MAX_DECODED_SIZE
            )));
        }
        if current.len() > RATIO_CHECK_FLOOR {
            let ratio = current.len() as u64 / input_size as u64;
            if ratio > MAX_EXPANSION_RATIO {
                return Err(Error::Decode(format!(
                    "suspicious expansion: {} bytes grew to {} ({}x)",
                    input_size,
                    current.len(),
                    ratio
                )));
            }
        }
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}
