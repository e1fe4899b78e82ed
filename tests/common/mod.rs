//! Shared fixtures for integration tests.
#![allow(dead_code)]

//!
//! Documents are built through the public writer so every test input is
//! also a writer output, and each page carries a marker content stream
//! naming its original position.

use bytes::Bytes;
use pdf_smith::writer::{DocumentWriter, ObjectSerializer};
use pdf_smith::{Document, Object, ObjectRef};
use std::collections::HashMap;

/// An n-page document whose page i (0-based) draws marker text
/// `"page-{i+1}"`.
pub fn sample_document(page_count: usize) -> Document {
    let mut objects: HashMap<ObjectRef, Object> = HashMap::new();
    let catalog = ObjectRef::new(1, 0);
    let pages_root = ObjectRef::new(2, 0);

    let mut kids = Vec::new();
    let mut next = 3u32;
    for n in 1..=page_count {
        let page_ref = ObjectRef::new(next, 0);
        let stream_ref = ObjectRef::new(next + 1, 0);
        next += 2;

        objects.insert(
            page_ref,
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Page")),
                ("Parent", Object::Reference(pages_root)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, 612.0, 792.0)),
                ("Contents", Object::Reference(stream_ref)),
            ]),
        );
        objects.insert(
            stream_ref,
            Object::Stream {
                dict: HashMap::new(),
                data: Bytes::from(format!("BT /F1 24 Tf 72 720 Td (page-{}) Tj ET", n)),
            },
        );
        kids.push(Object::Reference(page_ref));
    }

    objects.insert(
        pages_root,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Count", ObjectSerializer::integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]),
    );
    objects.insert(
        catalog,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", Object::Reference(pages_root)),
        ]),
    );

    let writer = DocumentWriter::from_objects((1, 7), &objects, catalog, None).unwrap();
    Document::parse(writer.to_bytes().unwrap()).unwrap()
}

/// The marker (`"page-N"`) drawn by page `index` (0-based), read back
/// from the decoded content stream.
pub fn marker_of(doc: &mut Document, index: usize) -> String {
    let content = String::from_utf8_lossy(&content_of(doc, index)).to_string();
    let start = content.find('(').unwrap() + 1;
    let end = content.find(')').unwrap();
    content[start..end].to_string()
}

/// Decoded content-stream bytes of page `index` (0-based).
pub fn content_of(doc: &mut Document, index: usize) -> Vec<u8> {
    let page = doc.page(index).unwrap();
    let contents_ref = page
        .dict
        .get("Contents")
        .and_then(|c| c.as_reference())
        .unwrap();
    let contents = doc.load_object(contents_ref).unwrap();
    contents.decode_stream_data().unwrap()
}

/// /Rotate of page `index`, following inheritance, defaulting to 0.
pub fn rotation_of(doc: &mut Document, index: usize) -> i64 {
    doc.page(index)
        .unwrap()
        .dict
        .get("Rotate")
        .and_then(|r| r.as_integer())
        .unwrap_or(0)
}
