//! Best-effort document compaction.
//!
//! Every level performs the structural part: a full rewrite that prunes
//! unreachable objects and renumbers densely, which is where stale
//! incremental history and orphaned objects go away. From level 4 up,
//! stream payloads that carry no filter are additionally deflated, but
//! only when that actually shrinks them, so the output is never worse
//! than the plain rewrite. Already-compact input may come out no
//! smaller; size reduction is advisory, correctness is not.

use crate::document::Document;
use crate::error::Result;
use crate::object::Object;
use crate::writer::DocumentWriter;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

/// Deflate kicks in at this level and above.
const DEFLATE_THRESHOLD: u32 = 4;

/// Rewrite the document compactly. `level` is 1-9 and clamps into
/// range.
pub fn compress(doc: &mut Document, level: u32) -> Result<Document> {
    let level = level.clamp(1, 9);
    let mut writer = DocumentWriter::from_document(doc)?;

    if level >= DEFLATE_THRESHOLD {
        writer.for_each_object_mut(|obj| deflate_in_place(obj, level));
    }

    Document::parse(writer.to_bytes()?)
}

/// Deflate an unfiltered stream payload when the result is smaller.
///
/// Streams that already carry a filter are left alone: re-encoding
/// filtered data would mean decoding it first, and double-compressing
/// rarely wins.
fn deflate_in_place(obj: &mut Object, level: u32) {
    let Object::Stream { dict, data } = obj else {
        return;
    };
    if dict.contains_key("Filter") || data.is_empty() {
        return;
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    let compressed = encoder
        .write_all(data)
        .and_then(|_| encoder.finish());

    match compressed {
        Ok(compressed) if compressed.len() < data.len() => {
            dict.insert(
                "Filter".to_string(),
                Object::Name("FlateDecode".to_string()),
            );
            *data = Bytes::from(compressed);
        },
        Ok(_) => {},
        Err(e) => log::warn!("deflate failed, keeping stream uncompressed: {}", e),
    }
}
