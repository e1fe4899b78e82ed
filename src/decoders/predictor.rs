//! Predictor reversal for Flate and LZW streams.
//!
//! `/DecodeParms` with `/Predictor` 2 means TIFF horizontal differencing;
//! 10 and up mean PNG row filters, where every row carries its own filter
//! tag byte regardless of which value 10-15 was declared.

use crate::error::{Error, Result};

/// Decode parameters from a stream's `/DecodeParms`.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm: 1 = none, 2 = TIFF, 10-15 = PNG
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding any tag byte.
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// The PNG filter unit: whole bytes per pixel, minimum 1.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Decode(format!("predictor {} is not defined", other))),
    }
}

/// TIFF predictor 2: each sample stores the delta from its left neighbor.
fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component is not supported",
            params.bits_per_component
        )));
    }

    let row_bytes = params.row_bytes();
    if row_bytes == 0 || data.len() % row_bytes != 0 {
        return Err(Error::Decode(format!(
            "predictor data of {} bytes does not divide into {}-byte rows",
            data.len(),
            row_bytes
        )));
    }

    let colors = params.colors;
    let mut output = Vec::with_capacity(data.len());

    for row in data.chunks_exact(row_bytes) {
        let row_start = output.len();
        output.extend_from_slice(&row[..colors.min(row.len())]);
        for i in colors..row.len() {
            let left = output[row_start + i - colors];
            output.push(row[i].wrapping_add(left));
        }
    }

    Ok(output)
}

/// PNG row filters. Each row is `[tag][filtered bytes]`; the tag selects
/// None/Sub/Up/Average/Paeth for that row.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_bytes = params.row_bytes();
    let stride = row_bytes + 1;
    if data.len() % stride != 0 {
        return Err(Error::Decode(format!(
            "predictor data of {} bytes does not divide into {}-byte rows",
            data.len(),
            stride
        )));
    }

    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity((data.len() / stride) * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut row = vec![0u8; row_bytes];

    for chunk in data.chunks_exact(stride) {
        let tag = chunk[0];
        let filtered = &chunk[1..];

        match tag {
            0 => row.copy_from_slice(filtered),
            1 => {
                // Sub
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    row[i] = filtered[i].wrapping_add(left);
                }
            },
            2 => {
                // Up
                for i in 0..row_bytes {
                    row[i] = filtered[i].wrapping_add(prev_row[i]);
                }
            },
            3 => {
                // Average
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = filtered[i].wrapping_add(((left + up) / 2) as u8);
                }
            },
            4 => {
                // Paeth
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] as i16 } else { 0 };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bpp { prev_row[i - bpp] as i16 } else { 0 };
                    row[i] = filtered[i].wrapping_add(paeth(left, up, up_left) as u8);
                }
            },
            other => {
                return Err(Error::Decode(format!("PNG row filter tag {} is invalid", other)));
            },
        }

        output.extend_from_slice(&row);
        std::mem::swap(&mut prev_row, &mut row);
    }

    Ok(output)
}

/// Paeth selector from the PNG specification.
fn paeth(a: i16, b: i16, c: i16) -> i16 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
