//! Full-rewrite document writer.
//!
//! Assembles a complete single-revision PDF file from a parsed document
//! or an explicit object set: header, body, classic xref table, and
//! trailer. Objects are gathered by walking references from the catalog,
//! so anything unreachable from `/Root` (or `/Info`) is dropped, and the
//! survivors are renumbered densely starting at 1.

use super::object_serializer::ObjectSerializer;
use crate::document::Document;
use crate::encryption::{random_bytes, Algorithm, EncryptDictBuilder, EncryptionWriteHandler};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io::Write;

/// Encryption state for an output file.
#[derive(Debug)]
struct EncryptionPlan {
    dict: HashMap<String, Object>,
    handler: EncryptionWriteHandler,
}

/// Writes a document as a fresh single-revision file.
///
/// Incremental history from the source file is flattened away. All
/// generation numbers in the output are 0.
#[derive(Debug)]
pub struct DocumentWriter {
    version: (u8, u8),
    /// Renumbered objects with dense ids 1..=n, in id order.
    objects: Vec<(u32, Object)>,
    root_id: u32,
    info_id: Option<u32>,
    file_id: Vec<u8>,
    encryption: Option<EncryptionPlan>,
}

impl DocumentWriter {
    /// Capture every object reachable from a parsed document's catalog.
    ///
    /// If the document is encrypted its handler must already be
    /// authenticated; stream payloads are decrypted while copying, so
    /// the output is a plaintext file unless [`encrypt`] is called.
    ///
    /// [`encrypt`]: Self::encrypt
    pub fn from_document(doc: &mut Document) -> Result<Self> {
        if doc.needs_password() {
            return Err(Error::Encryption(
                "document is encrypted; authenticate before rewriting".to_string(),
            ));
        }

        let trailer = doc.trailer().as_dict().ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: "trailer is not a dictionary".to_string(),
        })?;
        let root = trailer
            .get("Root")
            .and_then(|r| r.as_reference())
            .ok_or_else(|| Error::MalformedDocument {
                offset: 0,
                reason: "trailer has no /Root reference".to_string(),
            })?;
        let info = trailer.get("Info").and_then(|o| o.as_reference());
        let version = doc.version();

        let fetch = |r: ObjectRef, doc: &mut Document| -> Result<Object> {
            let mut obj = doc.load_object(r)?;
            if let Object::Stream { data, .. } = &mut obj {
                // Loaded stream payloads are still ciphertext; strings
                // were already decrypted at load time.
                if let Some(handler) = doc.encryption().filter(|h| h.is_authenticated()) {
                    let plain = handler.decrypt_stream(data, r.id, r.gen.into())?;
                    *data = Bytes::from(plain);
                }
            }
            Ok(obj)
        };

        let (objects, root_id, info_id) =
            collect_objects(root, info, |r| fetch(r, doc))?;

        Ok(Self {
            version,
            objects,
            root_id,
            info_id,
            file_id: random_bytes(16),
            encryption: None,
        })
    }

    /// Build a writer from an explicit object set.
    ///
    /// Used by the page editors, which assemble their result as a map
    /// before serialization. Objects not reachable from `root` or
    /// `info` are dropped.
    pub fn from_objects(
        version: (u8, u8),
        objects: &HashMap<ObjectRef, Object>,
        root: ObjectRef,
        info: Option<ObjectRef>,
    ) -> Result<Self> {
        if !objects.contains_key(&root) {
            return Err(Error::MalformedDocument {
                offset: 0,
                reason: format!("catalog {} {} missing from object set", root.id, root.gen),
            });
        }

        let (collected, root_id, info_id) = collect_objects(root, info, |r| {
            objects
                .get(&r)
                .cloned()
                .ok_or(Error::ObjectNotFound(r.id, r.gen))
        })?;

        Ok(Self {
            version,
            objects: collected,
            root_id,
            info_id,
            file_id: random_bytes(16),
            encryption: None,
        })
    }

    /// The PDF version the output will advertise.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Raise the output version if it is below `version`.
    pub fn require_version(&mut self, version: (u8, u8)) {
        if version > self.version {
            self.version = version;
        }
    }

    /// Number of objects that will be written, not counting the
    /// `/Encrypt` dictionary.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Visit every captured object mutably before serialization.
    ///
    /// The compression pass uses this to re-filter stream payloads after
    /// the reachability walk has settled the object set.
    pub fn for_each_object_mut(&mut self, mut f: impl FnMut(&mut Object)) {
        for (_, obj) in &mut self.objects {
            f(obj);
        }
    }

    /// Merge entries into the document information dictionary, creating
    /// one when the source had none.
    pub fn merge_info(&mut self, entries: Vec<(&str, Object)>) {
        match self.info_id {
            Some(id) => {
                if let Some((_, obj)) = self.objects.iter_mut().find(|(oid, _)| *oid == id) {
                    if let Some(dict) = obj.as_dict_mut() {
                        for (key, value) in entries {
                            dict.insert(key.to_string(), value);
                        }
                        return;
                    }
                    // /Info pointed at a non-dictionary; replace it
                    *obj = ObjectSerializer::dict(entries);
                }
            },
            None => {
                let id = self.objects.len() as u32 + 1;
                self.objects.push((id, ObjectSerializer::dict(entries)));
                self.info_id = Some(id);
            },
        }
    }

    /// Encrypt the output with the given settings.
    ///
    /// The trailer `/ID` doubles as key material, so the builder is fed
    /// this writer's file identifier. The output version is raised to
    /// the minimum the chosen cipher needs.
    pub fn encrypt(&mut self, builder: EncryptDictBuilder) -> Result<()> {
        let (dict, handler) = builder.build(&self.file_id)?;
        let floor = match handler.algorithm() {
            Algorithm::Rc4_40 => (1, 2),
            Algorithm::Rc4_128 => (1, 4),
            Algorithm::Aes128 => (1, 6),
            Algorithm::Aes256 => (2, 0),
        };
        self.require_version(floor);
        self.encryption = Some(EncryptionPlan { dict, handler });
        Ok(())
    }

    /// Serialize the complete file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let serializer = ObjectSerializer::compact();
        let mut output: Vec<u8> = Vec::new();
        let mut xref_offsets: Vec<(u32, usize)> = Vec::with_capacity(self.objects.len() + 1);

        writeln!(output, "%PDF-{}.{}", self.version.0, self.version.1)?;
        // Binary marker so transfer tools treat the file as binary
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        for (id, obj) in &self.objects {
            xref_offsets.push((*id, output.len()));
            match &self.encryption {
                Some(plan) => {
                    let bytes =
                        serializer.serialize_indirect_encrypted(*id, 0, obj, &plan.handler)?;
                    output.extend_from_slice(&bytes);
                },
                None => {
                    output.extend_from_slice(&serializer.serialize_indirect(*id, 0, obj));
                },
            }
        }

        let encrypt_id = self.encryption.as_ref().map(|plan| {
            // The encryption dictionary itself stays in the clear
            let id = self.objects.len() as u32 + 1;
            xref_offsets.push((id, output.len()));
            let obj = Object::Dictionary(plan.dict.clone());
            output.extend_from_slice(&serializer.serialize_indirect(id, 0, &obj));
            id
        });

        let size = xref_offsets.len() as u32 + 1;
        let xref_start = output.len();
        writeln!(output, "xref")?;
        writeln!(output, "0 {}", size)?;
        // Object 0 is always free
        writeln!(output, "0000000000 65535 f ")?;

        xref_offsets.sort_by_key(|(id, _)| *id);
        for (_, offset) in &xref_offsets {
            writeln!(output, "{:010} 00000 n ", offset)?;
        }

        let mut trailer = vec![
            ("Size", ObjectSerializer::integer(size as i64)),
            ("Root", ObjectSerializer::reference(self.root_id, 0)),
        ];
        if let Some(info_id) = self.info_id {
            trailer.push(("Info", ObjectSerializer::reference(info_id, 0)));
        }
        trailer.push((
            "ID",
            Object::Array(vec![
                Object::String(self.file_id.clone()),
                Object::String(self.file_id.clone()),
            ]),
        ));
        if let Some(encrypt_id) = encrypt_id {
            trailer.push(("Encrypt", ObjectSerializer::reference(encrypt_id, 0)));
        }

        writeln!(output, "trailer")?;
        output.extend_from_slice(&serializer.serialize(&ObjectSerializer::dict(trailer)));
        writeln!(output)?;
        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        write!(output, "%%EOF")?;

        Ok(output)
    }

    /// Serialize and write the file to disk.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Walk references breadth-first from the catalog, assigning dense new
/// ids in discovery order, then rewrite every reference to the new
/// numbering.
///
/// A reference whose target cannot be fetched becomes a `null` object
/// rather than failing the whole rewrite; dangling references are
/// routine in real files.
fn collect_objects(
    root: ObjectRef,
    info: Option<ObjectRef>,
    mut fetch: impl FnMut(ObjectRef) -> Result<Object>,
) -> Result<(Vec<(u32, Object)>, u32, Option<u32>)> {
    let mut ids: HashMap<ObjectRef, u32> = HashMap::new();
    let mut queue: VecDeque<ObjectRef> = VecDeque::new();
    let mut next_id = 1u32;

    let mut admit = |r: ObjectRef, ids: &mut HashMap<ObjectRef, u32>,
                     queue: &mut VecDeque<ObjectRef>| {
        *ids.entry(r).or_insert_with(|| {
            queue.push_back(r);
            let id = next_id;
            next_id += 1;
            id
        })
    };

    let root_id = admit(root, &mut ids, &mut queue);
    let info_id = info.map(|r| admit(r, &mut ids, &mut queue));

    let mut bodies: Vec<(u32, Object)> = Vec::new();
    while let Some(r) = queue.pop_front() {
        let mut obj = match fetch(r) {
            Ok(obj) => obj,
            Err(err) => {
                log::warn!(
                    "object {} {} unavailable during rewrite ({}), writing null",
                    r.id,
                    r.gen,
                    err
                );
                Object::Null
            },
        };
        if let Object::Stream { dict, .. } = &mut obj {
            // The serializer recomputes /Length; an indirect length
            // reference must not drag its target into the output
            dict.remove("Length");
        }
        discover_refs(&obj, &mut |r| {
            admit(r, &mut ids, &mut queue);
        });
        bodies.push((ids[&r], obj));
    }

    for (_, obj) in &mut bodies {
        rewrite_refs(obj, &ids);
    }
    bodies.sort_by_key(|(id, _)| *id);

    Ok((bodies, root_id, info_id))
}

/// Visit every reference in an object, dictionaries in sorted key order
/// so that id assignment is deterministic.
fn discover_refs(obj: &Object, visit: &mut impl FnMut(ObjectRef)) {
    match obj {
        Object::Reference(r) => visit(*r),
        Object::Array(items) => {
            for item in items {
                discover_refs(item, visit);
            }
        },
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            let mut keys: Vec<_> = dict.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = dict.get(key) {
                    discover_refs(value, visit);
                }
            }
        },
        _ => {},
    }
}

/// Rewrite every reference to its renumbered target.
fn rewrite_refs(obj: &mut Object, ids: &HashMap<ObjectRef, u32>) {
    match obj {
        Object::Reference(r) => {
            if let Some(new_id) = ids.get(r) {
                *r = ObjectRef::new(*new_id, 0);
            }
        },
        Object::Array(items) => {
            for item in items {
                rewrite_refs(item, ids);
            }
        },
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            for value in dict.values_mut() {
                rewrite_refs(value, ids);
            }
        },
        _ => {},
    }
}
