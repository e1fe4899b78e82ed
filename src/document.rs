//! Document loading and object access.
//!
//! A [`Document`] owns the raw file bytes and resolves objects lazily:
//! opening a file parses only the header, the cross-reference data, and
//! the trailer. Individual objects are parsed on first access and cached,
//! so touching one page of a thousand-page file stays cheap.

use crate::encryption::EncryptionHandler;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::parser::parse_indirect_object;
use crate::xref::{
    find_subslice, find_xref_offset, parse_xref, reconstruct_xref, CrossRefTable, XRefEntryType,
};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Nested loads allowed before assuming the file is hostile.
const MAX_RECURSION_DEPTH: u32 = 100;

/// Page tree depth cap.
const MAX_PAGE_TREE_DEPTH: usize = 50;

/// The header must appear within this many leading bytes.
const HEADER_SCAN_WINDOW: usize = 1024;

/// Attributes a page inherits from ancestor Pages nodes (Table 30).
const INHERITABLE_PAGE_ATTRS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// One page in document order.
///
/// `dict` is the page dictionary with inherited attributes already merged
/// in, so consumers never need to walk back up the tree.
#[derive(Debug, Clone)]
pub struct PageNode {
    /// Indirect reference of the page object
    pub reference: ObjectRef,
    /// Page dictionary, inheritance resolved
    pub dict: HashMap<String, Object>,
}

/// A parsed PDF document.
///
/// # Example
///
/// ```no_run
/// use pdf_smith::document::Document;
///
/// let mut doc = Document::open("sample.pdf")?;
/// println!("PDF {}.{}, {} pages", doc.version().0, doc.version().1, doc.page_count()?);
/// # Ok::<(), pdf_smith::error::Error>(())
/// ```
pub struct Document {
    /// Raw file bytes
    data: Bytes,
    /// Header version (major, minor)
    version: (u8, u8),
    /// Object number to location index
    xref: CrossRefTable,
    /// Trailer dictionary
    trailer: Object,
    /// Objects parsed so far
    object_cache: HashMap<ObjectRef, Object>,
    /// Objects currently being loaded, for cycle detection
    resolving_stack: RefCell<HashSet<ObjectRef>>,
    recursion_depth: RefCell<u32>,
    /// Present when the trailer names an /Encrypt dictionary
    encryption: Option<EncryptionHandler>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("bytes", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.object_cache.len())
            .field("encrypted", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Open a document from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse(data)
    }

    /// Parse a document from bytes.
    ///
    /// Locates the header and newest xref section, follows the `/Prev`
    /// chain, and initializes decryption if the trailer names an
    /// `/Encrypt` dictionary (the empty password is tried automatically).
    /// Unusable xref data falls back to scanning for object headers.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;

        let xref = match load_xref(&data) {
            Ok(xref) if !xref.is_empty() => xref,
            Ok(_) => {
                log::warn!("xref section is empty, rebuilding by scan");
                reconstruct_xref(&data)?
            },
            Err(e) => {
                log::warn!("xref unusable ({}), rebuilding by scan", e);
                reconstruct_xref(&data).map_err(|_| e)?
            },
        };

        let trailer = match xref.trailer() {
            Some(dict) => Object::Dictionary(dict.clone()),
            None => Object::Dictionary(HashMap::new()),
        };

        let mut document = Self {
            data,
            version,
            xref,
            trailer,
            object_cache: HashMap::new(),
            resolving_stack: RefCell::new(HashSet::new()),
            recursion_depth: RefCell::new(0),
            encryption: None,
        };

        document.recover_root_if_missing();
        document.init_encryption()?;

        Ok(document)
    }

    /// Header version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The trailer dictionary.
    pub fn trailer(&self) -> &Object {
        &self.trailer
    }

    /// The raw bytes this document was parsed from.
    pub fn raw_bytes(&self) -> &Bytes {
        &self.data
    }

    pub(crate) fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Whether the trailer names an /Encrypt dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Whether the document is encrypted and no password has worked yet.
    pub fn needs_password(&self) -> bool {
        self.encryption
            .as_ref()
            .is_some_and(|h| !h.is_authenticated())
    }

    pub(crate) fn encryption(&self) -> Option<&EncryptionHandler> {
        self.encryption.as_ref()
    }

    /// Try a password against the user and then the owner slot.
    ///
    /// Returns Ok(true) once either accepts. Unencrypted documents accept
    /// anything; there is nothing to unlock.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<bool> {
        match &mut self.encryption {
            Some(handler) => {
                let ok = handler.try_password(password)?;
                if ok {
                    // cached objects may hold still-encrypted strings
                    self.object_cache.clear();
                }
                Ok(ok)
            },
            None => Ok(true),
        }
    }

    /// Load an object by reference, consulting the cache first.
    ///
    /// Objects missing from the xref (or marked free there) get one
    /// last chance via a full-file header scan before failing with
    /// [`Error::ObjectNotFound`].
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }

        {
            let depth = *self.recursion_depth.borrow();
            if depth >= MAX_RECURSION_DEPTH {
                return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
            }
        }
        if self.resolving_stack.borrow().contains(&obj_ref) {
            log::error!("object {} is part of a reference cycle", obj_ref);
            return Err(Error::CircularReference(obj_ref));
        }

        self.resolving_stack.borrow_mut().insert(obj_ref);
        *self.recursion_depth.borrow_mut() += 1;

        let result = self.load_object_inner(obj_ref);

        *self.recursion_depth.borrow_mut() -= 1;
        self.resolving_stack.borrow_mut().remove(&obj_ref);

        result
    }

    fn load_object_inner(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = match self.xref.get(obj_ref.id) {
            Some(entry) if entry.in_use => entry.clone(),
            Some(_) => {
                log::warn!("object {} is marked free, scanning for a live copy", obj_ref);
                let offset = self.scan_for_object(obj_ref)?;
                return self.load_uncompressed_object(obj_ref, offset);
            },
            None => {
                log::warn!(
                    "object {} absent from xref ({} entries), scanning file",
                    obj_ref,
                    self.xref.len()
                );
                let offset = self.scan_for_object(obj_ref)?;
                return self.load_uncompressed_object(obj_ref, offset);
            },
        };

        match entry.entry_type {
            XRefEntryType::Uncompressed => self.load_uncompressed_object(obj_ref, entry.offset),
            XRefEntryType::Compressed => {
                self.load_compressed_object(obj_ref, entry.offset as u32)
            },
            XRefEntryType::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    /// Parse `N G obj ... endobj` at a byte offset.
    fn load_uncompressed_object(&mut self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(Error::MalformedDocument {
                offset: start,
                reason: format!("object {} offset beyond end of file", obj_ref),
            });
        }

        let parsed = match parse_indirect_object(&self.data[start..]) {
            Ok((_, parsed)) => Some(parsed),
            Err(_) => {
                // xref offsets are sometimes a few bytes off; look for the
                // header in a short window before the claimed position
                self.reparse_near(obj_ref, start)
            },
        };

        let (found_ref, mut obj) = match parsed {
            Some(found) => found,
            None => {
                log::warn!(
                    "object {} at offset {} does not parse, substituting null",
                    obj_ref,
                    offset
                );
                (obj_ref, Object::Null)
            },
        };

        if found_ref != obj_ref {
            log::warn!(
                "offset {} holds object {} but xref claimed {}",
                offset,
                found_ref,
                obj_ref
            );
        }

        if let Some(handler) = &self.encryption {
            if handler.is_authenticated() {
                decrypt_strings(&mut obj, handler, obj_ref.id, obj_ref.gen as u32)?;
            }
        }

        self.object_cache.insert(obj_ref, obj.clone());
        Ok(obj)
    }

    fn reparse_near(&self, obj_ref: ObjectRef, start: usize) -> Option<(ObjectRef, Object)> {
        let window_start = start.saturating_sub(100);
        let header = format!("{} {} obj", obj_ref.id, obj_ref.gen);
        let pos = find_subslice(&self.data[window_start..], header.as_bytes())?;
        let corrected = window_start + pos;
        if corrected == start {
            return None;
        }

        log::info!(
            "object {} found at offset {} (xref said {})",
            obj_ref,
            corrected,
            start
        );
        parse_indirect_object(&self.data[corrected..]).ok().map(|(_, p)| p)
    }

    /// Pull a member object out of its object stream, caching every
    /// member the stream holds.
    fn load_compressed_object(&mut self, obj_ref: ObjectRef, container_num: u32) -> Result<Object> {
        let container_entry =
            self.xref
                .get(container_num)
                .cloned()
                .ok_or(Error::ObjectNotFound(container_num, 0))?;

        if container_entry.entry_type != XRefEntryType::Uncompressed {
            return Err(Error::MalformedDocument {
                offset: 0,
                reason: format!(
                    "object stream {} is not stored as a top-level object",
                    container_num
                ),
            });
        }

        let container_ref = ObjectRef::new(container_num, 0);
        let container = self.load_uncompressed_object(container_ref, container_entry.offset)?;

        let members = match self.encryption.as_ref().filter(|h| h.is_authenticated()) {
            Some(handler) => {
                let decrypt = |data: &[u8]| handler.decrypt_stream(data, container_num, 0);
                crate::objstm::parse_object_stream_with_decryption(
                    &container,
                    Some(&decrypt),
                    container_num,
                    0,
                )?
            },
            None => crate::objstm::parse_object_stream(&container)?,
        };

        let requested = members
            .get(&obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        for (member_num, member) in members {
            self.object_cache.insert(ObjectRef::new(member_num, 0), member);
        }

        Ok(requested)
    }

    /// Resolve one level of indirection: references load, everything else
    /// passes through unchanged.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(obj_ref) => self.load_object(*obj_ref),
            other => Ok(other.clone()),
        }
    }

    /// Last-ditch lookup: scan the whole buffer for `N G obj`.
    ///
    /// The LAST occurrence wins, since incremental updates append newer
    /// bodies for the same object number.
    fn scan_for_object(&self, obj_ref: ObjectRef) -> Result<u64> {
        let pattern = format!("{} {} obj", obj_ref.id, obj_ref.gen);
        let pattern = pattern.as_bytes();

        let mut search_end = self.data.len();
        while let Some(pos) = crate::xref::rfind_subslice(&self.data[..search_end], pattern) {
            let header_ok = pos == 0 || matches!(self.data[pos - 1], b'\n' | b'\r' | b' ' | 0x00);
            let after = pos + pattern.len();
            let tail_ok = match self.data.get(after) {
                None => true,
                Some(&c) => matches!(c, b'\n' | b'\r' | b' ' | b'\t' | b'<' | b'['),
            };

            if header_ok && tail_ok {
                log::info!("found object {} by scan at offset {}", obj_ref, pos);
                return Ok(pos as u64);
            }
            search_end = pos;
        }

        Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// The document catalog (the trailer's /Root).
    pub fn catalog(&mut self) -> Result<Object> {
        let root_ref = self
            .trailer
            .as_dict()
            .and_then(|d| d.get("Root"))
            .and_then(|r| r.as_reference())
            .ok_or_else(|| Error::MalformedDocument {
                offset: 0,
                reason: "trailer has no /Root reference".to_string(),
            })?;

        self.load_object(root_ref)
    }

    /// Number of pages.
    ///
    /// Trusts the root node's /Count, falling back to a tree walk when
    /// the entry is missing or lies about being a number.
    pub fn page_count(&mut self) -> Result<usize> {
        let root = self.page_tree_root()?;
        let count = self
            .load_object(root)?
            .as_dict()
            .and_then(|d| d.get("Count"))
            .and_then(|c| c.as_integer());

        match count {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => {
                log::warn!("page tree /Count missing or invalid, walking the tree");
                Ok(self.pages()?.len())
            },
        }
    }

    /// All pages in document order, inheritance resolved.
    pub fn pages(&mut self) -> Result<Vec<PageNode>> {
        let root = self.page_tree_root()?;
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(root, &HashMap::new(), &mut visited, &mut out, 0)?;
        Ok(out)
    }

    /// One page by zero-based index.
    pub fn page(&mut self, index: usize) -> Result<PageNode> {
        let mut pages = self.pages()?;
        if index >= pages.len() {
            return Err(Error::InvalidPageRange {
                start: index + 1,
                end: index + 1,
                page_count: pages.len(),
            });
        }
        Ok(pages.swap_remove(index))
    }

    fn page_tree_root(&mut self) -> Result<ObjectRef> {
        let catalog = self.catalog()?;
        catalog
            .as_dict()
            .and_then(|d| d.get("Pages"))
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::MalformedDocument {
                offset: 0,
                reason: "catalog has no /Pages reference".to_string(),
            })
    }

    fn collect_pages(
        &mut self,
        node_ref: ObjectRef,
        inherited: &HashMap<String, Object>,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<PageNode>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_PAGE_TREE_DEPTH {
            log::warn!("page tree deeper than {} levels, pruning walk", MAX_PAGE_TREE_DEPTH);
            return Ok(());
        }
        if !visited.insert(node_ref) {
            log::warn!("page tree node {} appears twice, skipping repeat", node_ref);
            return Ok(());
        }

        let node = match self.load_object(node_ref) {
            Ok(node) => node,
            Err(e) => {
                log::warn!("page tree node {} does not load ({}), skipping", node_ref, e);
                return Ok(());
            },
        };
        let dict = match node.as_dict() {
            Some(d) => d,
            None => {
                log::warn!("page tree node {} is not a dictionary, skipping", node_ref);
                return Ok(());
            },
        };

        let node_type = dict.get("Type").and_then(|t| t.as_name());
        let is_pages = node_type == Some("Pages") || (node_type.is_none() && dict.contains_key("Kids"));

        if is_pages {
            // nearer ancestors override farther ones
            let mut child_inherited = inherited.clone();
            for attr in INHERITABLE_PAGE_ATTRS {
                if let Some(value) = dict.get(attr) {
                    child_inherited.insert(attr.to_string(), value.clone());
                }
            }

            let kids = match dict.get("Kids").and_then(|k| k.as_array()) {
                Some(kids) => kids.clone(),
                None => {
                    log::warn!("Pages node {} has no /Kids array", node_ref);
                    return Ok(());
                },
            };

            for kid in kids {
                if let Some(kid_ref) = kid.as_reference() {
                    self.collect_pages(kid_ref, &child_inherited, visited, out, depth + 1)?;
                } else {
                    log::warn!("non-reference kid under Pages node {}", node_ref);
                }
            }
        } else if node_type == Some("Page") {
            let mut page_dict = dict.clone();
            for attr in INHERITABLE_PAGE_ATTRS {
                if !page_dict.contains_key(attr) {
                    if let Some(value) = inherited.get(attr) {
                        page_dict.insert(attr.to_string(), value.clone());
                    }
                }
            }
            out.push(PageNode {
                reference: node_ref,
                dict: page_dict,
            });
        } else {
            log::warn!(
                "page tree node {} has unexpected type {:?}",
                node_ref,
                node_type.unwrap_or("(none)")
            );
        }

        Ok(())
    }

    /// Decode a stream's payload, decrypting first when this document is
    /// encrypted and unlocked.
    pub(crate) fn decode_stream(&self, stream_obj: &Object, obj_ref: ObjectRef) -> Result<Vec<u8>> {
        match self.encryption.as_ref().filter(|h| h.is_authenticated()) {
            Some(handler) => {
                let decrypt =
                    |data: &[u8]| handler.decrypt_stream(data, obj_ref.id, obj_ref.gen as u32);
                stream_obj.decode_stream_data_with_decryption(
                    Some(&decrypt),
                    obj_ref.id,
                    obj_ref.gen as u32,
                )
            },
            None => stream_obj.decode_stream_data(),
        }
    }

    /// Files rescued by header scanning may lack a trailer /Root; find a
    /// catalog object and synthesize one.
    fn recover_root_if_missing(&mut self) {
        let has_root = self
            .trailer
            .as_dict()
            .map(|d| d.contains_key("Root"))
            .unwrap_or(false);
        if has_root {
            return;
        }

        log::warn!("trailer has no /Root, searching loaded objects for a catalog");

        let mut numbers: Vec<u32> = self.xref.all_object_numbers().collect();
        numbers.sort_unstable();

        for number in numbers {
            let obj_ref = ObjectRef::new(number, 0);
            let obj = match self.load_object(obj_ref) {
                Ok(obj) => obj,
                Err(_) => continue,
            };
            let is_catalog = obj
                .as_dict()
                .and_then(|d| d.get("Type"))
                .and_then(|t| t.as_name())
                == Some("Catalog");

            if is_catalog {
                log::info!("using object {} as document catalog", obj_ref);
                let mut dict = self
                    .trailer
                    .as_dict()
                    .cloned()
                    .unwrap_or_default();
                dict.insert("Root".to_string(), Object::Reference(obj_ref));
                dict.entry("Size".to_string())
                    .or_insert(Object::Integer(number as i64 + 1));
                self.trailer = Object::Dictionary(dict);
                return;
            }
        }
    }

    /// Build the decryption handler from the trailer's /Encrypt entry and
    /// try the empty password, the common case for owner-restricted files.
    fn init_encryption(&mut self) -> Result<()> {
        let (encrypt_entry, file_id) = match self.trailer.as_dict() {
            Some(trailer) => {
                let entry = match trailer.get("Encrypt") {
                    Some(entry) => entry.clone(),
                    None => return Ok(()),
                };
                let file_id = trailer
                    .get("ID")
                    .and_then(|id| id.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|first| first.as_string())
                    .map(|bytes| bytes.to_vec())
                    .unwrap_or_else(|| {
                        log::warn!("encrypted document without usable /ID, deriving keys from an empty one");
                        Vec::new()
                    });
                (entry, file_id)
            },
            None => return Ok(()),
        };

        let encrypt_obj = match encrypt_entry {
            Object::Dictionary(_) => encrypt_entry,
            Object::Reference(obj_ref) => self.load_object(obj_ref)?,
            other => {
                return Err(Error::Encryption(format!(
                    "/Encrypt is a {}, expected a dictionary",
                    other.type_name()
                )));
            },
        };
        let encrypt_dict = encrypt_obj.as_dict().ok_or_else(|| {
            Error::Encryption("/Encrypt did not resolve to a dictionary".to_string())
        })?;

        let mut handler = EncryptionHandler::from_encrypt_dict(encrypt_dict, file_id)?;

        match handler.try_password(b"") {
            Ok(true) => log::debug!("empty password accepted"),
            Ok(false) => log::info!("document requires a password"),
            Err(e) => return Err(e),
        }

        self.encryption = Some(handler);
        self.object_cache.clear();
        Ok(())
    }
}

/// Decrypt every string in an object tree in place.
///
/// Strings share the containing indirect object's key. Stream data is
/// left alone here; it is decrypted on decode.
fn decrypt_strings(
    obj: &mut Object,
    handler: &EncryptionHandler,
    obj_num: u32,
    gen_num: u32,
) -> Result<()> {
    match obj {
        Object::String(bytes) => {
            *bytes = handler.decrypt_string(bytes, obj_num, gen_num)?;
        },
        Object::Array(items) => {
            for item in items {
                decrypt_strings(item, handler, obj_num, gen_num)?;
            }
        },
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            for value in dict.values_mut() {
                decrypt_strings(value, handler, obj_num, gen_num)?;
            }
        },
        _ => {},
    }
    Ok(())
}

/// Locate `%PDF-M.m` within the first kilobyte and return the version.
fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_SCAN_WINDOW)];
    let pos = find_subslice(window, b"%PDF-").ok_or(Error::MalformedDocument {
        offset: 0,
        reason: "no %PDF- header in the first 1024 bytes".to_string(),
    })?;

    let version = &data[pos + 5..];
    if version.len() < 3 || version[1] != b'.' {
        return Err(Error::MalformedDocument {
            offset: pos,
            reason: "header version is not of the form M.m".to_string(),
        });
    }

    let (major, minor) = (version[0], version[2]);
    if !major.is_ascii_digit() || !minor.is_ascii_digit() {
        return Err(Error::MalformedDocument {
            offset: pos,
            reason: format!("non-numeric header version {}.{}", major as char, minor as char),
        });
    }

    let (major, minor) = (major - b'0', minor - b'0');
    if major == 0 || major > 2 {
        return Err(Error::MalformedDocument {
            offset: pos,
            reason: format!("unsupported PDF version {}.{}", major, minor),
        });
    }

    Ok((major, minor))
}

fn load_xref(data: &[u8]) -> Result<CrossRefTable> {
    let offset = find_xref_offset(data)?;
    parse_xref(data, offset)
}
