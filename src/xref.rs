//! Cross-reference index.
//!
//! The xref maps object numbers to byte offsets, giving random access to
//! the body. Both the classic table form (`xref` / subsections / `trailer`)
//! and cross-reference streams (`/Type /XRef`, PDF 1.5+) are supported,
//! with `/Prev` chains followed so incremental updates resolve newest
//! first. When neither form is usable the index can be rebuilt by
//! scanning the buffer for `N G obj` headers.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::{parse_indirect_object, parse_object};
use std::collections::HashMap;

/// Longest /Prev chain accepted before assuming a cycle.
const MAX_PREV_DEPTH: u32 = 100;

/// Largest subsection entry count accepted from file data.
const MAX_SUBSECTION_COUNT: u32 = 1_000_000;

/// Cross-reference entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an object stored directly in the file
    Uncompressed,
    /// Entry for an object inside an object stream (PDF 1.5+)
    Compressed,
}

/// One cross-reference entry.
///
/// For uncompressed entries `offset` is a byte position and `generation`
/// the object's generation. For compressed entries `offset` is the
/// containing object stream's number and `generation` the index within
/// that stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset, or object stream number for compressed entries
    pub offset: u64,
    /// Generation number, or index within the stream for compressed entries
    pub generation: u16,
    /// Whether the object is in use
    pub in_use: bool,
}

impl XRefEntry {
    /// Create an entry from a classic table line (`f`/`n` flag).
    pub fn new(offset: u64, generation: u16, in_use: bool) -> Self {
        Self {
            entry_type: if in_use {
                XRefEntryType::Uncompressed
            } else {
                XRefEntryType::Free
            },
            offset,
            generation,
            in_use,
        }
    }

    /// Create an in-use entry at a byte offset.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
            in_use: true,
        }
    }

    /// Create an entry for an object living in an object stream.
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
            in_use: true,
        }
    }

    /// Create a free-list entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
            in_use: false,
        }
    }
}

/// Cross-reference index mapping object numbers to locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    pub(crate) entries: HashMap<u32, XRefEntry>,
    /// Trailer dictionary; for xref streams this is the stream dictionary
    trailer: Option<HashMap<String, Object>>,
}

impl CrossRefTable {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: HashMap<String, Object>) {
        self.trailer = Some(trailer);
    }

    /// Get the trailer dictionary if present.
    pub fn trailer(&self) -> Option<&HashMap<String, Object>> {
        self.trailer.as_ref()
    }

    /// Insert an entry, replacing any existing one for the same number.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Look up an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Check whether an object number is indexed.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// Iterate over all indexed object numbers.
    pub fn all_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Fold an older section into this one.
    ///
    /// Existing entries win: the caller walks sections newest to oldest,
    /// and an incremental update's entry shadows the original's. The
    /// newest trailer is kept for the same reason.
    pub fn merge_from(&mut self, other: CrossRefTable) {
        for (obj_num, entry) in other.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }

        if self.trailer.is_none() {
            self.trailer = other.trailer;
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the needle's first occurrence in the haystack.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Find the needle's last occurrence in the haystack.
pub(crate) fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Find the byte offset of the newest xref section.
///
/// Scans the final 2048 bytes for the last `startxref` keyword and
/// parses the decimal offset on the following line.
pub fn find_xref_offset(buf: &[u8]) -> Result<u64> {
    let tail_len = buf.len().min(2048);
    let tail_start = buf.len() - tail_len;
    let tail = &buf[tail_start..];

    let keyword_pos = rfind_subslice(tail, b"startxref").ok_or(Error::MalformedDocument {
        offset: tail_start,
        reason: "startxref keyword not found".to_string(),
    })?;

    let after = &tail[keyword_pos + b"startxref".len()..];
    let text = String::from_utf8_lossy(after);

    for line in split_lines(&text) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.bytes().all(|c| c.is_ascii_digit()) {
            return trimmed.parse::<u64>().map_err(|_| Error::MalformedDocument {
                offset: tail_start + keyword_pos,
                reason: "startxref offset does not parse".to_string(),
            });
        }
        break;
    }

    Err(Error::MalformedDocument {
        offset: tail_start + keyword_pos,
        reason: "no numeric offset after startxref".to_string(),
    })
}

/// Parse the cross-reference data starting at `offset`.
///
/// Detects classic table vs xref stream, then follows the trailer's
/// `/Prev` pointers through older sections, newer entries shadowing
/// older ones.
pub fn parse_xref(buf: &[u8], offset: u64) -> Result<CrossRefTable> {
    parse_xref_recursive(buf, offset, 0)
}

fn parse_xref_recursive(buf: &[u8], offset: u64, depth: u32) -> Result<CrossRefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::MalformedDocument {
            offset: offset as usize,
            reason: format!("/Prev chain exceeds {} sections", MAX_PREV_DEPTH),
        });
    }

    let start = offset as usize;
    if start >= buf.len() {
        return Err(Error::MalformedDocument {
            offset: start,
            reason: format!("xref offset {} beyond end of file ({})", start, buf.len()),
        });
    }

    let peek = &buf[start..buf.len().min(start + 20)];
    let peek_trimmed = trim_pdf_whitespace(peek);

    log::debug!("parsing xref section at offset {}", offset);

    let mut xref = if peek_trimmed.starts_with(b"xref") {
        parse_traditional_xref(buf, start)?
    } else if peek_trimmed.first().is_some_and(|c| c.is_ascii_digit()) {
        match parse_xref_stream(buf, start) {
            Ok(xref) => xref,
            Err(stream_err) => {
                // Some writers park a classic table behind a numeric
                // junk line; give the table parser one chance.
                log::debug!("xref stream parse failed ({}), trying table form", stream_err);
                parse_traditional_xref(buf, start).map_err(|table_err| {
                    Error::MalformedDocument {
                        offset: start,
                        reason: format!(
                            "unusable xref section (stream: {}, table: {})",
                            stream_err, table_err
                        ),
                    }
                })?
            },
        }
    } else {
        return Err(Error::MalformedDocument {
            offset: start,
            reason: "xref section starts with neither 'xref' nor an object header".to_string(),
        });
    };

    let prev_offset = xref
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(|obj| obj.as_integer());

    if let Some(prev) = prev_offset {
        if prev >= 0 {
            log::debug!("following /Prev from offset {} to {}", offset, prev);
            let prev_xref = parse_xref_recursive(buf, prev as u64, depth + 1)?;
            xref.merge_from(prev_xref);
        }
    }

    Ok(xref)
}

/// Parse a classic cross-reference table and its trailer dictionary.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000018 00000 n
/// 0000000154 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
///
/// Malformed entry lines are tolerated: each consumes its slot as a free
/// entry so the subsection numbering stays aligned.
fn parse_traditional_xref(buf: &[u8], offset: usize) -> Result<CrossRefTable> {
    // The section ends at its own startxref keyword; bounding the window
    // keeps the line split proportional to the section, not the file.
    let window_end = find_subslice(&buf[offset..], b"startxref")
        .map(|p| offset + p)
        .unwrap_or(buf.len());
    let window = &buf[offset..window_end];

    let text = String::from_utf8_lossy(window);
    let lines = split_lines(&text);

    let mut xref = CrossRefTable::new();
    let mut line_idx = 0;

    // Locate the xref keyword, skipping blank lines
    loop {
        match lines.get(line_idx) {
            Some(line) if line.trim().is_empty() => line_idx += 1,
            Some(line) if line.trim().starts_with("xref") => {
                line_idx += 1;
                break;
            },
            _ => {
                return Err(Error::MalformedDocument {
                    offset,
                    reason: "expected xref keyword".to_string(),
                });
            },
        }
    }

    // Subsections until the trailer keyword
    while line_idx < lines.len() {
        let header = lines[line_idx].trim();
        line_idx += 1;

        if header.starts_with("trailer") {
            break;
        }
        if header.is_empty() || header.starts_with('%') {
            continue;
        }

        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }

        let (start_obj, count) = match (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
            (Ok(s), Ok(c)) => (s, c),
            _ => {
                return Err(Error::MalformedDocument {
                    offset,
                    reason: format!("bad xref subsection header: {:?}", header),
                });
            },
        };

        if count > MAX_SUBSECTION_COUNT {
            return Err(Error::MalformedDocument {
                offset,
                reason: format!("xref subsection claims {} entries", count),
            });
        }

        let mut i = 0;
        while i < count && line_idx < lines.len() {
            let line = lines[line_idx].trim();
            line_idx += 1;

            if line.is_empty() {
                continue;
            }
            if line.starts_with("trailer") {
                log::warn!("xref subsection ended early: {} of {} entries", i, count);
                line_idx -= 1;
                break;
            }

            let entry = parse_table_entry(line).unwrap_or_else(|| {
                log::warn!("malformed xref entry for object {}: {:?}", start_obj + i, line);
                // keep the slot so later entries stay numbered right
                XRefEntry::free(0, 65535)
            });
            xref.add_entry(start_obj + i, entry);
            i += 1;
        }
    }

    // The trailer dictionary follows the trailer keyword
    if let Some(trailer_pos) = find_subslice(window, b"trailer") {
        let dict_input = &window[trailer_pos + b"trailer".len()..];
        if let Ok((_, Object::Dictionary(dict))) = parse_object(dict_input) {
            xref.set_trailer(dict);
        } else {
            log::warn!("trailer keyword without parseable dictionary at offset {}", offset);
        }
    }

    Ok(xref)
}

/// Parse one `nnnnnnnnnn ggggg n/f` line. Extra trailing fields are
/// ignored; the flag is matched case-insensitively on its first letter.
fn parse_table_entry(line: &str) -> Option<XRefEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }

    let offset: u64 = parts[0].parse().ok()?;
    let generation: u16 = parts[1].parse().ok()?;
    let in_use = match parts[2].chars().next()?.to_ascii_lowercase() {
        'n' => true,
        'f' => false,
        _ => return None,
    };

    Some(XRefEntry::new(offset, generation, in_use))
}

/// Parse a cross-reference stream (`/Type /XRef`).
///
/// The stream dictionary doubles as the trailer. `/W [w1 w2 w3]` gives
/// big-endian field widths; `/Index [start count ...]` lists subsection
/// ranges, defaulting to `[0 /Size]`. Field meanings per entry type:
/// 0 = free, 1 = byte offset + generation, 2 = object stream number +
/// index within it.
fn parse_xref_stream(buf: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, obj)) = parse_indirect_object(&buf[offset..]).map_err(|e| {
        Error::MalformedDocument {
            offset,
            reason: format!("xref stream object does not parse: {}", e),
        }
    })?;

    let (dict, _) = obj.as_stream().ok_or_else(|| Error::MalformedDocument {
        offset,
        reason: "xref stream is not a stream object".to_string(),
    })?;

    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "XRef" {
            return Err(Error::MalformedDocument {
                offset,
                reason: format!("expected /Type /XRef, found /{}", type_name),
            });
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_integer())
                .map(|v| v.max(0) as usize)
                .collect()
        })
        .ok_or_else(|| Error::MalformedDocument {
            offset,
            reason: "xref stream missing /W array".to_string(),
        })?;

    if widths.len() != 3 {
        return Err(Error::MalformedDocument {
            offset,
            reason: format!("/W has {} fields, expected 3", widths.len()),
        });
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let entry_size = w1 + w2 + w3;
    if entry_size == 0 {
        return Err(Error::MalformedDocument {
            offset,
            reason: "/W fields are all zero".to_string(),
        });
    }

    let size = dict
        .get("Size")
        .and_then(|s| s.as_integer())
        .ok_or_else(|| Error::MalformedDocument {
            offset,
            reason: "xref stream missing /Size".to_string(),
        })? as u32;

    let index_ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(arr) => arr
            .chunks_exact(2)
            .filter_map(|pair| {
                let start = pair[0].as_integer()? as u32;
                let count = pair[1].as_integer()? as u32;
                Some((start, count))
            })
            .collect(),
        None => vec![(0, size)],
    };

    // Filters and predictors are handled by the stream decode path
    let decoded_data = obj.decode_stream_data().map_err(|e| Error::MalformedDocument {
        offset,
        reason: format!("xref stream data does not decode: {}", e),
    })?;

    let mut xref = CrossRefTable::new();
    let mut data_pos = 0;

    for (start_obj, count) in index_ranges {
        if count > MAX_SUBSECTION_COUNT {
            return Err(Error::MalformedDocument {
                offset,
                reason: format!("xref stream subsection claims {} entries", count),
            });
        }
        for i in 0..count {
            if data_pos + entry_size > decoded_data.len() {
                return Err(Error::MalformedDocument {
                    offset,
                    reason: "xref stream data shorter than /Index claims".to_string(),
                });
            }

            let entry_data = &decoded_data[data_pos..data_pos + entry_size];
            data_pos += entry_size;

            // A zero-width type field defaults to type 1
            let entry_type = if w1 > 0 { read_be_int(&entry_data[..w1]) } else { 1 };
            let field2 = read_be_int(&entry_data[w1..w1 + w2]);
            let field3 = read_be_int(&entry_data[w1 + w2..]);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                other => {
                    return Err(Error::MalformedDocument {
                        offset,
                        reason: format!("xref stream entry type {} is invalid", other),
                    });
                },
            };

            xref.add_entry(start_obj + i, entry);
        }
    }

    let trailer = dict.clone();
    xref.set_trailer(trailer);

    Ok(xref)
}

/// Rebuild the index by scanning for `N G obj` headers.
///
/// Last resort for files whose xref data is missing or lies. Later
/// headers replace earlier ones for the same object number, which keeps
/// incremental updates winning. The newest trailer dictionary carrying
/// a /Root is recovered the same way; a document without one is handled
/// by the caller's catalog scan.
pub fn reconstruct_xref(buf: &[u8]) -> Result<CrossRefTable> {
    log::warn!("cross-reference data unusable, scanning {} bytes for object headers", buf.len());

    let mut xref = CrossRefTable::new();
    let mut pos = 0;

    while pos < buf.len() {
        if !buf[pos].is_ascii_digit() || (pos > 0 && !is_header_boundary(buf[pos - 1])) {
            pos += 1;
            continue;
        }

        match match_object_header(&buf[pos..]) {
            Some((id, gen, len)) => {
                xref.add_entry(id, XRefEntry::uncompressed(pos as u64, gen));
                pos += len;
            },
            None => pos += 1,
        }
    }

    if xref.is_empty() {
        return Err(Error::MalformedDocument {
            offset: 0,
            reason: "no object headers found while reconstructing xref".to_string(),
        });
    }

    log::info!("reconstructed xref with {} objects", xref.len());

    // Prefer the newest trailer that names a catalog
    let mut search_end = buf.len();
    while let Some(tpos) = rfind_subslice(&buf[..search_end], b"trailer") {
        let dict_input = &buf[tpos + b"trailer".len()..];
        if let Ok((_, Object::Dictionary(dict))) = parse_object(dict_input) {
            if dict.contains_key("Root") {
                xref.set_trailer(dict);
                break;
            }
        }
        search_end = tpos;
    }

    Ok(xref)
}

/// Match `N G obj` at the start of the input. Returns (id, gen, matched_len).
fn match_object_header(input: &[u8]) -> Option<(u32, u16, usize)> {
    let mut i = 0;

    while i < input.len() && input[i].is_ascii_digit() {
        i += 1;
    }
    // a real object number has at most 10 digits
    if i == 0 || i > 10 {
        return None;
    }
    let id: u32 = std::str::from_utf8(&input[..i]).ok()?.parse().ok()?;

    let gap = i;
    while i < input.len() && (input[i] == b' ' || input[i] == b'\t') {
        i += 1;
    }
    if i == gap {
        return None;
    }

    let gen_start = i;
    while i < input.len() && input[i].is_ascii_digit() {
        i += 1;
    }
    if i == gen_start || i - gen_start > 5 {
        return None;
    }
    let gen: u16 = std::str::from_utf8(&input[gen_start..i]).ok()?.parse().ok()?;

    let gap = i;
    while i < input.len() && (input[i] == b' ' || input[i] == b'\t') {
        i += 1;
    }
    if i == gap || !input[i..].starts_with(b"obj") {
        return None;
    }
    i += 3;

    // the keyword must end at whitespace or a delimiter
    match input.get(i) {
        None => Some((id, gen, i)),
        Some(&c) if is_header_boundary(c) || matches!(c, b'<' | b'[' | b'/' | b'(') => {
            Some((id, gen, i))
        },
        Some(_) => None,
    }
}

fn is_header_boundary(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn trim_pdf_whitespace(data: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < data.len() && is_header_boundary(data[start]) {
        start += 1;
    }
    &data[start..]
}

/// Accumulate a big-endian integer from up to 8 bytes.
fn read_be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Split text into lines on LF, CRLF, or lone CR.
///
/// Classic Mac writers used bare CR, which `str::lines` does not split.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            },
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            },
            _ => i += 1,
        }
    }

    if start < bytes.len() {
        lines.push(&text[start..]);
    }

    lines
}
