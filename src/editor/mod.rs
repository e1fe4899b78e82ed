//! Document editing operations.
//!
//! ```text
//! Document(s)
//!     ↓
//! [pages]      extract / delete / merge / split / rotate
//! [compress]   prune + renumber, optional stream deflate
//! [stamp]      signer metadata into /Info
//!     ↓
//! full-rewrite writer → fresh Document
//! ```
//!
//! Every operation is all-or-nothing: inputs are read, a new object set
//! is assembled, and the result is serialized and re-parsed. Inputs are
//! never mutated, and a failed operation returns an error before any
//! output exists.

mod compress;
mod pages;
mod stamp;

pub use compress::compress;
pub use pages::{
    delete_pages, extract_pages, merge_documents, rotate_pages, split_document, SplitMode,
};
pub use stamp::stamp_signature_metadata;

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures: small documents built through the writer, with
    //! per-page marker content streams so tests can track page identity
    //! across operations.

    use crate::document::Document;
    use crate::object::{Object, ObjectRef};
    use crate::writer::{DocumentWriter, ObjectSerializer};
    use bytes::Bytes;
    use std::collections::HashMap;

    /// An n-page document whose page i (0-based) draws marker text
    /// `"page-{i+1}"`.
    pub fn sample_document(page_count: usize) -> Document {
        let streams: Vec<String> = (1..=page_count)
            .map(|n| format!("BT /F1 24 Tf 72 720 Td (page-{}) Tj ET", n))
            .collect();
        build(&streams)
    }

    /// A single-page document with the given content stream.
    pub fn document_with_content(content: &str) -> Document {
        build(&[content.to_string()])
    }

    fn build(streams: &[String]) -> Document {
        let mut objects: HashMap<ObjectRef, Object> = HashMap::new();
        let catalog = ObjectRef::new(1, 0);
        let pages_root = ObjectRef::new(2, 0);

        let mut kids = Vec::new();
        let mut next = 3u32;
        for content in streams {
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
                    data: Bytes::from(content.clone().into_bytes()),
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

    /// Decoded content-stream bytes of page `index` (0-based).
    pub fn content_of(doc: &mut Document, index: usize) -> Vec<u8> {
        let page = doc.page(index).unwrap();
        let contents_ref = page
            .dict
            .get("Contents")
            .and_then(|c| c.as_reference())
            .unwrap();
        let contents = doc.load_object(contents_ref).unwrap();
        doc.decode_stream(&contents, contents_ref).unwrap()
    }
}
