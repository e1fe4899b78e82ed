//! LZWDecode.
//!
//! PDF's LZW variant (ISO 32000-1 section 7.4.4): MSB-first codes
//! starting at 9 bits, growing to 12, clear code 256, EOD 257, and
//! EarlyChange=1 by default, meaning the code width bumps one code
//! earlier than plain LZW. That matches the TIFF flavor, so weezl's
//! TIFF mode does the heavy lifting; a small fallback decoder handles
//! streams weezl refuses.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use weezl::{decode::Decoder as WeezlDecoder, BitOrder};

const CLEAR_CODE: u16 = 256;
const EOD_CODE: u16 = 257;
const MAX_TABLE: usize = 4096;

/// LZWDecode filter.
pub struct LzwDecoder;

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8);
        match decoder.decode(input) {
            Ok(output) => Ok(output),
            Err(e) => {
                log::debug!("weezl rejected LZW data ({:?}), using fallback decoder", e);
                decode_lzw_fallback(input)
            },
        }
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

/// Straightforward table-based decoder with EarlyChange=1 semantics.
fn decode_lzw_fallback(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut reader = BitReader::new(input);
    let mut table = base_table();
    let mut width: u8 = 9;
    let mut prev: Option<u16> = None;

    loop {
        // EarlyChange=1: grow when the NEXT code would not fit
        if width < 12 && table.len() == (1usize << width) - 1 {
            width += 1;
        }

        let code = match reader.read(width) {
            Some(c) => c,
            None => break,
        };

        if code == EOD_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table.truncate(EOD_CODE as usize + 1);
            width = 9;
            prev = None;
            continue;
        }

        let idx = code as usize;
        let entry = match prev {
            _ if idx < table.len() => table[idx].clone(),
            // the one-ahead case: new entry is prev + prev[0]
            Some(p) if idx == table.len() => {
                let prev_entry = &table[p as usize];
                let mut entry = prev_entry.clone();
                entry.push(prev_entry[0]);
                entry
            },
            _ => {
                return Err(Error::Decode(format!(
                    "LZW code {} has no table entry (table size {}, width {})",
                    code,
                    table.len(),
                    width
                )));
            },
        };

        output.extend_from_slice(&entry);

        if let Some(p) = prev {
            if table.len() < MAX_TABLE {
                let mut new_entry = table[p as usize].clone();
                new_entry.push(entry[0]);
                table.push(new_entry);
            }
        }

        prev = Some(code);
    }

    Ok(output)
}

/// Codes 0-255 map to single bytes; 256 and 257 are control slots.
fn base_table() -> Vec<Vec<u8>> {
    let mut table: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());
    table
}

/// MSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    acc_bits: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            acc_bits: 0,
        }
    }

    /// Read up to 16 bits; None once the input runs dry.
    fn read(&mut self, bits: u8) -> Option<u16> {
        debug_assert!(bits <= 16);
        while self.acc_bits < bits {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.acc = (self.acc << 8) | byte as u32;
            self.acc_bits += 8;
        }

        self.acc_bits -= bits;
        let value = (self.acc >> self.acc_bits) & ((1u32 << bits) - 1);
        Some(value as u16)
    }
}
