//! /ByteRange geometry for signature placeholders.
//!
//! A signature dictionary covers the whole file except its own
//! /Contents hex string: `[0 len1 off2 len2]`, where the gap between
//! `len1` and `off2` is exactly the placeholder, angle brackets
//! included. Everything here works on raw bytes since the offsets are
//! positions in the serialized file, not in any parsed structure.

use crate::error::{Error, Result};
use crate::xref::{find_subslice, rfind_subslice};

/// Placeholder width for a signature with the given DER capacity:
/// two hex digits per byte plus the angle brackets.
pub fn placeholder_len(signature_capacity: usize) -> usize {
    signature_capacity * 2 + 2
}

/// All-zero hex placeholder of exactly `placeholder_len(capacity)`
/// bytes, brackets included.
pub fn zero_placeholder(signature_capacity: usize) -> String {
    format!("<{}>", "0".repeat(signature_capacity * 2))
}

/// Offset of the `<` opening a hex /Contents value, scanning forward
/// from `from`.
///
/// Page dictionaries carry a /Contents key too, holding a reference,
/// so occurrences not followed by a hex string are skipped.
pub fn find_contents_start(data: &[u8], from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(rel) = find_subslice(&data[search..], b"/Contents") {
        let mut pos = search + rel + b"/Contents".len();
        while pos < data.len() && matches!(data[pos], b' ' | b'\t' | b'\r' | b'\n') {
            pos += 1;
        }
        if data.get(pos) == Some(&b'<') {
            return Some(pos);
        }
        search += rel + b"/Contents".len();
    }
    None
}

/// The byte range for a placeholder of `placeholder_len` bytes
/// starting at `contents_offset` in a file of `file_len` bytes.
pub fn compute(file_len: usize, contents_offset: usize, placeholder_len: usize) -> [i64; 4] {
    let gap_end = contents_offset + placeholder_len;
    [
        0,
        contents_offset as i64,
        gap_end as i64,
        file_len as i64 - gap_end as i64,
    ]
}

/// PDF array text for a byte range.
pub fn format(range: &[i64; 4]) -> String {
    format!("[{} {} {} {}]", range[0], range[1], range[2], range[3])
}

/// Check that a range starts at 0, ends at the file end, and leaves no
/// negative gap.
pub fn validate(range: &[i64; 4], file_len: usize) -> Result<()> {
    if range[0] != 0 {
        return Err(Error::SigningFailure(format!(
            "byte range must start at 0, got {}",
            range[0]
        )));
    }
    if range[1] < 0 || range[2] < range[1] || range[3] < 0 {
        return Err(Error::SigningFailure(format!(
            "byte range is not monotonic: {}",
            format(range)
        )));
    }
    if range[2] + range[3] != file_len as i64 {
        return Err(Error::SigningFailure(format!(
            "byte range ends at {}, file is {} bytes",
            range[2] + range[3],
            file_len
        )));
    }
    Ok(())
}

/// Concatenation of the two covered ranges, the input to the digest.
pub fn signed_bytes(data: &[u8], range: &[i64; 4]) -> Result<Vec<u8>> {
    let (off1, len1) = (range[0] as usize, range[1] as usize);
    let (off2, len2) = (range[2] as usize, range[3] as usize);
    if off1 + len1 > data.len() || off2 + len2 > data.len() {
        return Err(Error::SigningFailure(format!(
            "byte range {} exceeds file of {} bytes",
            format(range),
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(len1 + len2);
    out.extend_from_slice(&data[off1..off1 + len1]);
    out.extend_from_slice(&data[off2..off2 + len2]);
    Ok(out)
}

/// Overwrite the placeholder at `contents_offset` with the hex-encoded
/// signature, zero-padded on the right to keep the width fixed.
pub fn patch_contents(
    data: &mut [u8],
    contents_offset: usize,
    placeholder_len: usize,
    signature_hex: &str,
) -> Result<()> {
    if signature_hex.len() + 2 > placeholder_len {
        return Err(Error::SigningFailure(format!(
            "signature needs {} bytes, placeholder holds {}",
            signature_hex.len() + 2,
            placeholder_len
        )));
    }
    if contents_offset + placeholder_len > data.len() {
        return Err(Error::SigningFailure(
            "placeholder runs past the end of the file".to_string(),
        ));
    }

    let slot = &mut data[contents_offset..contents_offset + placeholder_len];
    slot[0] = b'<';
    slot[1..1 + signature_hex.len()].copy_from_slice(signature_hex.as_bytes());
    slot[1 + signature_hex.len()..placeholder_len - 1].fill(b'0');
    slot[placeholder_len - 1] = b'>';
    Ok(())
}

/// Parse the last /ByteRange array in the file.
///
/// Verification takes the range from the file itself, so a document
/// with several revisions yields the range of the newest signature.
pub fn parse_last(data: &[u8]) -> Result<[i64; 4]> {
    let key_pos = rfind_subslice(data, b"/ByteRange")
        .ok_or_else(|| Error::SigningFailure("no /ByteRange in file".to_string()))?;
    let tail = &data[key_pos + b"/ByteRange".len()..];

    let open = tail
        .iter()
        .position(|&b| b == b'[')
        .ok_or_else(|| Error::SigningFailure("/ByteRange has no array".to_string()))?;
    let close = tail[open..]
        .iter()
        .position(|&b| b == b']')
        .ok_or_else(|| Error::SigningFailure("/ByteRange array is unterminated".to_string()))?;

    let mut numbers = std::str::from_utf8(&tail[open + 1..open + close])
        .map_err(|_| Error::SigningFailure("/ByteRange is not ASCII".to_string()))?
        .split_ascii_whitespace()
        .map(|tok| {
            tok.parse::<i64>()
                .map_err(|_| Error::SigningFailure(format!("bad /ByteRange entry {:?}", tok)))
        });

    let mut range = [0i64; 4];
    for slot in &mut range {
        *slot = numbers
            .next()
            .transpose()?
            .ok_or_else(|| Error::SigningFailure("/ByteRange has fewer than 4 entries".to_string()))?;
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_width_matches_capacity() {
        assert_eq!(placeholder_len(8192), 16386);
        let p = zero_placeholder(4);
        assert_eq!(p, "<00000000>");
        assert_eq!(p.len(), placeholder_len(4));
    }

    #[test]
    fn test_compute_accounts_for_gap() {
        let range = compute(1000, 400, 100);
        assert_eq!(range, [0, 400, 500, 500]);
        validate(&range, 1000).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_end() {
        assert!(validate(&[0, 100, 150, 100], 200).is_err());
        assert!(validate(&[10, 100, 150, 50], 200).is_err());
        assert!(validate(&[0, 100, 50, 150], 200).is_err());
    }

    #[test]
    fn test_signed_bytes_skips_gap() {
        let data = b"AAABBBCCC";
        assert_eq!(signed_bytes(data, &[0, 3, 6, 3]).unwrap(), b"AAACCC");
        assert!(signed_bytes(data, &[0, 3, 6, 99]).is_err());
    }

    #[test]
    fn test_find_contents_skips_whitespace() {
        let data = b"<< /Contents\n  <0000> >>";
        let pos = find_contents_start(data, 0).unwrap();
        assert_eq!(data[pos], b'<');
        assert_eq!(&data[pos..pos + 6], b"<0000>");
    }

    #[test]
    fn test_find_contents_skips_reference_values() {
        let data = b"<< /Contents 5 0 R >> << /Type /Sig /Contents <0000> >>";
        let pos = find_contents_start(data, 0).unwrap();
        assert_eq!(&data[pos..pos + 6], b"<0000>");
    }

    #[test]
    fn test_patch_pads_with_zeros() {
        let mut data = b"XX<00000000>YY".to_vec();
        patch_contents(&mut data, 2, 10, "ABCD").unwrap();
        assert_eq!(&data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_patch_rejects_oversized_signature() {
        let mut data = b"XX<00000000>YY".to_vec();
        assert!(patch_contents(&mut data, 2, 10, "AABBCCDDEE").is_err());
    }

    #[test]
    fn test_parse_last_takes_newest_range() {
        let data = b"/ByteRange [0 10 20 5]junk/ByteRange [ 0 100 200 300 ]tail";
        assert_eq!(parse_last(data).unwrap(), [0, 100, 200, 300]);
    }

    #[test]
    fn test_parse_rejects_short_array() {
        assert!(parse_last(b"/ByteRange [0 10 20]").is_err());
        assert!(parse_last(b"no range here").is_err());
    }
}
