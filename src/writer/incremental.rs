//! Incremental update writer.
//!
//! Appends a new revision to an existing file instead of rewriting it:
//! the original bytes stay untouched, added or overridden objects go
//! after them, and a classic xref section with a `/Prev` link chains
//! back to the previous revision. Digital signatures depend on this,
//! since a rewrite would destroy the bytes a signature covers.

use super::object_serializer::ObjectSerializer;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::xref::find_xref_offset;
use std::collections::BTreeMap;
use std::io::Write;

enum Body {
    Object(Object),
    Raw(Vec<u8>),
}

/// Builds one appended revision for a parsed document.
pub struct IncrementalUpdate {
    base: Vec<u8>,
    prev_startxref: u64,
    trailer: BTreeMap<String, Object>,
    next_id: u32,
    additions: Vec<(ObjectRef, Body)>,
}

impl IncrementalUpdate {
    /// Start an update over the document's current bytes.
    pub fn new(doc: &Document) -> Result<Self> {
        let base = doc.raw_bytes().to_vec();
        let prev_startxref = find_xref_offset(&base)?;
        let trailer = doc
            .trailer()
            .as_dict()
            .ok_or_else(|| Error::MalformedDocument {
                offset: 0,
                reason: "trailer is not a dictionary".to_string(),
            })?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let max_num = doc.xref().all_object_numbers().max().unwrap_or(0);
        let size_hint = doc
            .trailer()
            .as_dict()
            .and_then(|d| d.get("Size"))
            .and_then(|s| s.as_integer())
            .unwrap_or(0)
            .max(0) as u32;

        Ok(Self {
            base,
            prev_startxref,
            trailer,
            next_id: (max_num + 1).max(size_hint),
            additions: Vec::new(),
        })
    }

    /// Allocate an object number unused by any revision so far.
    pub fn next_object_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Add an object to the new revision.
    ///
    /// Using the number of an existing object overrides it; the old
    /// body stays in the file but the new xref section shadows it.
    pub fn add_object(&mut self, obj_ref: ObjectRef, obj: Object) {
        self.additions.push((obj_ref, Body::Object(obj)));
    }

    /// Add an object whose body is already serialized.
    ///
    /// `body` is the bytes between `N G obj` and `endobj`. Signature
    /// dictionaries go through this path so their placeholder fields
    /// keep an exact, patchable width.
    pub fn add_raw_object(&mut self, obj_ref: ObjectRef, body: Vec<u8>) {
        self.additions.push((obj_ref, Body::Raw(body)));
    }

    /// Serialize the original file plus the appended revision.
    pub fn finish(self) -> Result<Vec<u8>> {
        let serializer = ObjectSerializer::compact();
        let mut out = self.base;
        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        // Later additions of the same number win
        let mut entries: BTreeMap<u32, (u16, Vec<u8>)> = BTreeMap::new();
        for (obj_ref, body) in self.additions {
            let bytes = match body {
                Body::Object(obj) => serializer.serialize(&obj),
                Body::Raw(raw) => raw,
            };
            entries.insert(obj_ref.id, (obj_ref.gen, bytes));
        }

        let mut offsets: Vec<(u32, u16, usize)> = Vec::with_capacity(entries.len());
        for (id, (gen, body)) in &entries {
            offsets.push((*id, *gen, out.len()));
            writeln!(out, "{} {} obj", id, gen)?;
            out.extend_from_slice(body);
            write!(out, "\nendobj\n")?;
        }

        let xref_start = out.len();
        writeln!(out, "xref")?;
        let mut i = 0;
        while i < offsets.len() {
            let mut j = i + 1;
            while j < offsets.len() && offsets[j].0 == offsets[j - 1].0 + 1 {
                j += 1;
            }
            writeln!(out, "{} {}", offsets[i].0, j - i)?;
            for (_, gen, offset) in &offsets[i..j] {
                writeln!(out, "{:010} {:05} n ", offset, gen)?;
            }
            i = j;
        }

        let mut trailer = self.trailer;
        // A previous revision may have used an xref stream; its
        // stream-specific trailer keys must not survive in a table
        for stale in ["Type", "Filter", "DecodeParms", "W", "Index", "Length", "XRefStm"] {
            trailer.remove(stale);
        }
        let size = offsets.iter().map(|(id, _, _)| id + 1).fold(self.next_id, u32::max);
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.prev_startxref as i64));

        let trailer_map = trailer.into_iter().collect();
        writeln!(out, "trailer")?;
        out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer_map)));
        writeln!(out)?;
        writeln!(out, "startxref")?;
        writeln!(out, "{}", xref_start)?;
        write!(out, "%%EOF")?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::DocumentWriter;
    use std::collections::HashMap;

    fn base_document() -> Document {
        let mut objects = HashMap::new();
        objects.insert(
            ObjectRef::new(1, 0),
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Catalog")),
                ("Pages", ObjectSerializer::reference(2, 0)),
            ]),
        );
        objects.insert(
            ObjectRef::new(2, 0),
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Pages")),
                ("Kids", Object::Array(vec![ObjectSerializer::reference(3, 0)])),
                ("Count", ObjectSerializer::integer(1)),
            ]),
        );
        objects.insert(
            ObjectRef::new(3, 0),
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Page")),
                ("Parent", ObjectSerializer::reference(2, 0)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, 612.0, 792.0)),
            ]),
        );
        objects.insert(
            ObjectRef::new(4, 0),
            ObjectSerializer::dict(vec![("Title", ObjectSerializer::string("Before"))]),
        );

        let writer = DocumentWriter::from_objects(
            (1, 7),
            &objects,
            ObjectRef::new(1, 0),
            Some(ObjectRef::new(4, 0)),
        )
        .unwrap();
        Document::parse(writer.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_base_bytes_are_preserved() {
        let doc = base_document();
        let original = doc.raw_bytes().to_vec();

        let mut update = IncrementalUpdate::new(&doc).unwrap();
        let id = update.next_object_id();
        update.add_object(
            ObjectRef::new(id, 0),
            ObjectSerializer::dict(vec![("Extra", ObjectSerializer::integer(7))]),
        );
        let bytes = update.finish().unwrap();

        assert!(bytes.len() > original.len());
        assert_eq!(&bytes[..original.len()], &original[..]);
    }

    #[test]
    fn test_override_shadows_old_object() {
        let doc = base_document();
        let info_ref = doc
            .trailer()
            .as_dict()
            .and_then(|d| d.get("Info"))
            .and_then(|o| o.as_reference())
            .unwrap();

        let mut update = IncrementalUpdate::new(&doc).unwrap();
        update.add_object(
            info_ref,
            ObjectSerializer::dict(vec![("Title", ObjectSerializer::string("After"))]),
        );
        let bytes = update.finish().unwrap();

        let mut updated = Document::parse(bytes).unwrap();
        let info = updated.load_object(info_ref).unwrap();
        assert_eq!(
            info.as_dict().and_then(|d| d.get("Title")).and_then(|t| t.as_string()),
            Some(b"After".as_ref())
        );
        // The rest of the document is untouched
        assert_eq!(updated.page_count().unwrap(), 1);
    }

    #[test]
    fn test_trailer_links_previous_revision() {
        let doc = base_document();
        let prev = find_xref_offset(doc.raw_bytes()).unwrap();

        let mut update = IncrementalUpdate::new(&doc).unwrap();
        let id = update.next_object_id();
        update.add_object(ObjectRef::new(id, 0), Object::Integer(1));
        let bytes = update.finish().unwrap();

        let updated = Document::parse(bytes).unwrap();
        let trailer = updated.trailer().as_dict().unwrap();
        assert_eq!(
            trailer.get("Prev").and_then(|p| p.as_integer()),
            Some(prev as i64)
        );
        assert!(trailer.get("Size").and_then(|s| s.as_integer()).unwrap() as u32 > id);
    }

    #[test]
    fn test_raw_body_is_written_verbatim() {
        let doc = base_document();
        let mut update = IncrementalUpdate::new(&doc).unwrap();
        let id = update.next_object_id();
        update.add_raw_object(ObjectRef::new(id, 0), b"<< /Answer 42 >>".to_vec());
        let bytes = update.finish().unwrap();

        assert!(
            String::from_utf8_lossy(&bytes).contains(&format!("{} 0 obj\n<< /Answer 42 >>", id))
        );
        let mut updated = Document::parse(bytes).unwrap();
        let obj = updated.load_object(ObjectRef::new(id, 0)).unwrap();
        assert_eq!(
            obj.as_dict().and_then(|d| d.get("Answer")).and_then(|a| a.as_integer()),
            Some(42)
        );
    }

    #[test]
    fn test_subsection_grouping() {
        let doc = base_document();
        let mut update = IncrementalUpdate::new(&doc).unwrap();
        // Contiguous pair plus an isolated override
        let a = update.next_object_id();
        let b = update.next_object_id();
        update.add_object(ObjectRef::new(a, 0), Object::Integer(1));
        update.add_object(ObjectRef::new(b, 0), Object::Integer(2));
        update.add_object(ObjectRef::new(1, 0), {
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Catalog")),
                ("Pages", ObjectSerializer::reference(2, 0)),
            ])
        });
        let bytes = update.finish().unwrap();
        let text = String::from_utf8_lossy(&bytes);

        let tail = &text[text.rfind("\nxref\n").unwrap()..];
        assert!(tail.contains("\n1 1\n"));
        assert!(tail.contains(&format!("\n{} 2\n", a)));

        let mut updated = Document::parse(bytes).unwrap();
        assert_eq!(updated.page_count().unwrap(), 1);
    }
}
