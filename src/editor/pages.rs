//! Structural page operations.
//!
//! Extract, delete, merge, split, and rotate all follow the same shape:
//! pick an ordered list of (source, page) pairs, deep-copy each page's
//! reachable subgraph into a fresh object set under a flat page tree,
//! and emit through the full-rewrite writer. The result is re-parsed so
//! callers always hold a self-consistent [`Document`].
//!
//! Page indices in the public API are 1-based and inclusive, matching
//! how people number pages; internal bookkeeping is 0-based.

use crate::document::{Document, PageNode};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::{DocumentWriter, ObjectSerializer};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// How [`split_document`] partitions a file.
#[derive(Debug, Clone)]
pub enum SplitMode {
    /// One single-page document per source page.
    Individual,
    /// One document per 1-based inclusive (start, end) range.
    Ranges(Vec<(usize, usize)>),
}

/// One selected page and an optional rotation to add to it.
struct PagePick {
    /// 0-based index into the source's page list
    index: usize,
    /// Degrees to add to the page's existing rotation
    rotate_by: Option<i64>,
}

impl PagePick {
    fn keep(index: usize) -> Self {
        Self {
            index,
            rotate_by: None,
        }
    }
}

/// New document containing pages `start..=end` of the source.
pub fn extract_pages(doc: &mut Document, start: usize, end: usize) -> Result<Document> {
    let page_count = doc.page_count()?;
    validate_range(start, end, page_count)?;

    let picks = (start..=end).map(|n| PagePick::keep(n - 1)).collect();
    rebuild(vec![(doc, picks)])
}

/// New document with the listed 1-based pages removed.
///
/// Duplicate indices are tolerated; removing every page is an error,
/// since an empty page tree is not a usable document.
pub fn delete_pages(doc: &mut Document, indices: &[usize]) -> Result<Document> {
    let page_count = doc.page_count()?;
    let mut doomed = HashSet::new();
    for &index in indices {
        if index < 1 || index > page_count {
            return Err(Error::InvalidPageRange {
                start: index,
                end: index,
                page_count,
            });
        }
        doomed.insert(index);
    }

    if doomed.len() == page_count {
        return Err(Error::InvalidPageRange {
            start: 1,
            end: page_count,
            page_count,
        });
    }

    let picks = (1..=page_count)
        .filter(|n| !doomed.contains(n))
        .map(|n| PagePick::keep(n - 1))
        .collect();
    rebuild(vec![(doc, picks)])
}

/// Concatenate the inputs' pages, in input order, into one document.
///
/// Every page subgraph is deep-copied and renumbered, so sources and
/// output share no object numbers.
pub fn merge_documents(docs: &mut [Document]) -> Result<Document> {
    if docs.is_empty() {
        return Err(Error::MalformedDocument {
            offset: 0,
            reason: "no documents to merge".to_string(),
        });
    }

    let mut inputs = Vec::with_capacity(docs.len());
    for doc in docs.iter_mut() {
        let page_count = doc.page_count()?;
        let picks = (0..page_count).map(PagePick::keep).collect();
        inputs.push((doc, picks));
    }
    rebuild(inputs)
}

/// Partition a document per the given mode.
///
/// `Individual` yields one single-page document per source page, in
/// order; `Ranges` yields one document per range, each validated like
/// [`extract_pages`].
pub fn split_document(doc: &mut Document, mode: &SplitMode) -> Result<Vec<Document>> {
    let page_count = doc.page_count()?;

    let ranges: Vec<(usize, usize)> = match mode {
        SplitMode::Individual => (1..=page_count).map(|n| (n, n)).collect(),
        SplitMode::Ranges(ranges) => {
            for &(start, end) in ranges {
                validate_range(start, end, page_count)?;
            }
            ranges.clone()
        },
    };

    let mut parts = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        let picks = (start..=end).map(|n| PagePick::keep(n - 1)).collect();
        parts.push(rebuild(vec![(&mut *doc, picks)])?);
    }
    Ok(parts)
}

/// Add `angle` degrees to each targeted page's rotation, modulo 360.
///
/// `targets` holds 1-based page indices; `None` rotates every page.
/// Only 90, 180, and 270 are accepted.
pub fn rotate_pages(
    doc: &mut Document,
    angle: i64,
    targets: Option<&[usize]>,
) -> Result<Document> {
    if !matches!(angle, 90 | 180 | 270) {
        return Err(Error::InvalidRotation(angle));
    }

    let page_count = doc.page_count()?;
    let rotated: HashSet<usize> = match targets {
        Some(indices) => {
            let mut set = HashSet::new();
            for &index in indices {
                if index < 1 || index > page_count {
                    return Err(Error::InvalidPageRange {
                        start: index,
                        end: index,
                        page_count,
                    });
                }
                set.insert(index);
            }
            set
        },
        None => (1..=page_count).collect(),
    };

    let picks = (1..=page_count)
        .map(|n| PagePick {
            index: n - 1,
            rotate_by: rotated.contains(&n).then_some(angle),
        })
        .collect();
    rebuild(vec![(doc, picks)])
}

fn validate_range(start: usize, end: usize, page_count: usize) -> Result<()> {
    if start < 1 || end > page_count || start > end {
        return Err(Error::InvalidPageRange {
            start,
            end,
            page_count,
        });
    }
    Ok(())
}

/// Assemble a new document from page picks across one or more sources.
///
/// Allocates ids in a fresh number space: catalog and page-tree root
/// first, then one page object per pick, then each source's copied
/// subgraph. The writer's reachability walk renumbers everything
/// densely again, so the interim numbering only has to be collision
/// free.
fn rebuild(inputs: Vec<(&mut Document, Vec<PagePick>)>) -> Result<Document> {
    let mut objects: HashMap<ObjectRef, Object> = HashMap::new();
    let mut next_id = 1u32;
    let mut alloc = || {
        let id = next_id;
        next_id += 1;
        ObjectRef::new(id, 0)
    };

    let catalog_ref = alloc();
    let pages_root_ref = alloc();

    let mut kid_refs: Vec<Object> = Vec::new();
    let mut version = (1, 4);

    for (doc, picks) in inputs {
        if doc.needs_password() {
            return Err(Error::Encryption(
                "document is encrypted; authenticate before editing".to_string(),
            ));
        }
        version = version.max(doc.version());

        let pages = doc.pages()?;
        // old reference -> copied reference, shared across this source's
        // picks so common resources are copied once
        let mut copied: HashMap<ObjectRef, ObjectRef> = HashMap::new();

        for pick in picks {
            let node = pages.get(pick.index).ok_or(Error::InvalidPageRange {
                start: pick.index + 1,
                end: pick.index + 1,
                page_count: pages.len(),
            })?;

            let page_ref = alloc();
            copied.insert(node.reference, page_ref);

            let page_dict = prepare_page_dict(node, pages_root_ref, pick.rotate_by);
            copy_subgraph(doc, &page_dict, &mut copied, &mut objects, &mut alloc)?;

            let mut remapped = Object::Dictionary(page_dict);
            remap_refs(&mut remapped, &copied);
            objects.insert(page_ref, remapped);
            kid_refs.push(Object::Reference(page_ref));
        }
    }

    objects.insert(
        pages_root_ref,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Kids", Object::Array(kid_refs.clone())),
            ("Count", ObjectSerializer::integer(kid_refs.len() as i64)),
        ]),
    );
    objects.insert(
        catalog_ref,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", Object::Reference(pages_root_ref)),
        ]),
    );

    let writer = DocumentWriter::from_objects(version, &objects, catalog_ref, None)?;
    Document::parse(writer.to_bytes()?)
}

/// Clone a page dictionary for the output tree: parent rebound to the
/// new root and rotation folded in when requested.
fn prepare_page_dict(
    node: &PageNode,
    pages_root: ObjectRef,
    rotate_by: Option<i64>,
) -> HashMap<String, Object> {
    let mut dict = node.dict.clone();
    dict.insert("Parent".to_string(), Object::Reference(pages_root));

    if let Some(delta) = rotate_by {
        let current = dict
            .get("Rotate")
            .and_then(|r| r.as_integer())
            .unwrap_or(0);
        let rotation = (current + delta).rem_euclid(360);
        dict.insert("Rotate".to_string(), Object::Integer(rotation));
    }

    dict
}

/// Breadth-first copy of everything a page dictionary references.
///
/// Two cuts keep the walk from dragging the source's whole tree along:
/// a referenced `/Pages` node (an ancestor, via `/Parent` chains in
/// annotation targets) is replaced by null, and any other page reached
/// indirectly loses its `/Parent` link. Unreadable targets also become
/// null; the writer treats dangling references the same way.
fn copy_subgraph(
    doc: &mut Document,
    root_dict: &HashMap<String, Object>,
    copied: &mut HashMap<ObjectRef, ObjectRef>,
    objects: &mut HashMap<ObjectRef, Object>,
    alloc: &mut impl FnMut() -> ObjectRef,
) -> Result<()> {
    let mut queue: VecDeque<ObjectRef> = VecDeque::new();

    let mut admit = |r: ObjectRef,
                     copied: &mut HashMap<ObjectRef, ObjectRef>,
                     queue: &mut VecDeque<ObjectRef>| {
        if !copied.contains_key(&r) {
            copied.insert(r, alloc());
            queue.push_back(r);
        }
    };

    for value in root_dict.values() {
        collect_refs(value, &mut |r| admit(r, copied, &mut queue));
    }

    while let Some(old_ref) = queue.pop_front() {
        let mut obj = match doc.load_object(old_ref) {
            Ok(obj) => obj,
            Err(e) => {
                log::warn!("object {} unreadable while copying pages ({})", old_ref, e);
                Object::Null
            },
        };

        match obj
            .as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(|t| t.as_name())
        {
            Some("Pages") => {
                // ancestor node; the new tree has its own root
                obj = Object::Null;
            },
            Some("Page") => {
                if let Some(dict) = obj.as_dict_mut() {
                    dict.remove("Parent");
                }
            },
            _ => {},
        }

        if let Object::Stream { data, .. } = &mut obj {
            // stream payloads from an encrypted source are ciphertext
            if let Some(handler) = doc.encryption().filter(|h| h.is_authenticated()) {
                let plain = handler.decrypt_stream(data, old_ref.id, old_ref.gen.into())?;
                *data = Bytes::from(plain);
            }
        }

        collect_refs(&obj, &mut |r| admit(r, copied, &mut queue));
        let mut remapped = obj;
        remap_refs(&mut remapped, copied);
        objects.insert(copied[&old_ref], remapped);
    }

    Ok(())
}

fn collect_refs(obj: &Object, visit: &mut impl FnMut(ObjectRef)) {
    match obj {
        Object::Reference(r) => visit(*r),
        Object::Array(items) => {
            for item in items {
                collect_refs(item, visit);
            }
        },
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            let mut keys: Vec<_> = dict.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = dict.get(key) {
                    collect_refs(value, visit);
                }
            }
        },
        _ => {},
    }
}

fn remap_refs(obj: &mut Object, map: &HashMap<ObjectRef, ObjectRef>) {
    match obj {
        Object::Reference(r) => {
            if let Some(new_ref) = map.get(r) {
                *r = *new_ref;
            }
        },
        Object::Array(items) => {
            for item in items {
                remap_refs(item, map);
            }
        },
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            for value in dict.values_mut() {
                remap_refs(value, map);
            }
        },
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::test_support::{content_of, sample_document};

    #[test]
    fn test_extract_middle_range() {
        let mut doc = sample_document(5);
        let mut out = extract_pages(&mut doc, 2, 4).unwrap();

        assert_eq!(out.page_count().unwrap(), 3);
        assert_eq!(content_of(&mut out, 0), content_of(&mut doc, 1));
        assert_eq!(content_of(&mut out, 1), content_of(&mut doc, 2));
        assert_eq!(content_of(&mut out, 2), content_of(&mut doc, 3));
    }

    #[test]
    fn test_extract_full_range_then_again() {
        let mut doc = sample_document(5);
        let mut first = extract_pages(&mut doc, 2, 4).unwrap();
        let mut second = extract_pages(&mut first, 1, 3).unwrap();

        assert_eq!(second.page_count().unwrap(), 3);
        for i in 0..3 {
            assert_eq!(content_of(&mut second, i), content_of(&mut doc, i + 1));
        }
    }

    #[test]
    fn test_extract_rejects_bad_ranges() {
        let mut doc = sample_document(5);
        for (start, end) in [(0, 3), (1, 6), (4, 2)] {
            match extract_pages(&mut doc, start, end) {
                Err(Error::InvalidPageRange { page_count: 5, .. }) => {},
                other => panic!("range {}-{}: expected InvalidPageRange, got {:?}", start, end, other),
            }
        }
    }

    #[test]
    fn test_delete_first_and_last() {
        let mut doc = sample_document(5);
        let mut out = delete_pages(&mut doc, &[1, 5]).unwrap();

        assert_eq!(out.page_count().unwrap(), 3);
        assert_eq!(content_of(&mut out, 0), content_of(&mut doc, 1));
        assert_eq!(content_of(&mut out, 1), content_of(&mut doc, 2));
        assert_eq!(content_of(&mut out, 2), content_of(&mut doc, 3));
    }

    #[test]
    fn test_delete_duplicates_idempotent() {
        let mut doc = sample_document(3);
        let mut out = delete_pages(&mut doc, &[2, 2, 2]).unwrap();
        assert_eq!(out.page_count().unwrap(), 2);

        let deleted = content_of(&mut doc, 1);
        assert_ne!(content_of(&mut out, 0), deleted);
        assert_ne!(content_of(&mut out, 1), deleted);
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut doc = sample_document(3);
        match delete_pages(&mut doc, &[2, 7]) {
            Err(Error::InvalidPageRange {
                start: 7,
                end: 7,
                page_count: 3,
            }) => {},
            other => panic!("expected InvalidPageRange, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_everything_rejected() {
        let mut doc = sample_document(2);
        assert!(matches!(
            delete_pages(&mut doc, &[1, 2]),
            Err(Error::InvalidPageRange { .. })
        ));
    }

    #[test]
    fn test_merge_preserves_order_and_content() {
        let mut a = sample_document(2);
        let b = sample_document(3);
        let mut inputs = vec![extract_pages(&mut a, 1, 2).unwrap(), b];

        let mut merged = merge_documents(&mut inputs).unwrap();
        assert_eq!(merged.page_count().unwrap(), 5);

        for i in 0..2 {
            assert_eq!(content_of(&mut merged, i), content_of(&mut inputs[0], i));
        }
        for i in 0..3 {
            assert_eq!(content_of(&mut merged, 2 + i), content_of(&mut inputs[1], i));
        }
    }

    #[test]
    fn test_merge_single_input() {
        let mut inputs = vec![sample_document(2)];
        let mut merged = merge_documents(&mut inputs).unwrap();
        assert_eq!(merged.page_count().unwrap(), 2);
    }

    #[test]
    fn test_merge_empty_rejected() {
        assert!(merge_documents(&mut []).is_err());
    }

    #[test]
    fn test_split_individual() {
        let mut doc = sample_document(3);
        let parts = split_document(&mut doc, &SplitMode::Individual).unwrap();
        assert_eq!(parts.len(), 3);

        for (i, mut part) in parts.into_iter().enumerate() {
            assert_eq!(part.page_count().unwrap(), 1);
            assert_eq!(content_of(&mut part, 0), content_of(&mut doc, i));
        }
    }

    #[test]
    fn test_split_ranges() {
        let mut doc = sample_document(5);
        let mode = SplitMode::Ranges(vec![(1, 2), (3, 5)]);
        let mut parts = split_document(&mut doc, &mode).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].page_count().unwrap(), 2);
        assert_eq!(parts[1].page_count().unwrap(), 3);
        assert_eq!(content_of(&mut parts[1], 0), content_of(&mut doc, 2));
    }

    #[test]
    fn test_split_range_validated() {
        let mut doc = sample_document(3);
        let mode = SplitMode::Ranges(vec![(2, 9)]);
        assert!(matches!(
            split_document(&mut doc, &mode),
            Err(Error::InvalidPageRange { .. })
        ));
    }

    #[test]
    fn test_rotate_all_four_times_is_identity() {
        let mut doc = sample_document(3);
        let original: Vec<i64> = (0..3)
            .map(|i| rotation_of(&mut doc, i))
            .collect();

        let mut current = rotate_pages(&mut doc, 90, None).unwrap();
        for _ in 0..3 {
            current = rotate_pages(&mut current, 90, None).unwrap();
        }

        for (i, &rotation) in original.iter().enumerate() {
            assert_eq!(rotation_of(&mut current, i), rotation);
        }
    }

    #[test]
    fn test_rotate_is_additive() {
        let mut doc = sample_document(3);
        // give page 2 a starting rotation of 90
        let mut staged = rotate_pages(&mut doc, 90, Some(&[2])).unwrap();
        assert_eq!(rotation_of(&mut staged, 1), 90);

        let mut out = rotate_pages(&mut staged, 180, Some(&[2])).unwrap();
        assert_eq!(rotation_of(&mut out, 1), 270);
        assert_eq!(rotation_of(&mut out, 0), 0);
        assert_eq!(rotation_of(&mut out, 2), 0);
    }

    #[test]
    fn test_rotate_rejects_bad_angle() {
        let mut doc = sample_document(1);
        for angle in [0, 45, 360, -90] {
            assert!(matches!(
                rotate_pages(&mut doc, angle, None),
                Err(Error::InvalidRotation(a)) if a == angle
            ));
        }
    }

    #[test]
    fn test_rotate_validates_targets() {
        let mut doc = sample_document(2);
        assert!(matches!(
            rotate_pages(&mut doc, 90, Some(&[3])),
            Err(Error::InvalidPageRange { .. })
        ));
    }

    fn rotation_of(doc: &mut Document, index: usize) -> i64 {
        doc.page(index)
            .unwrap()
            .dict
            .get("Rotate")
            .and_then(|r| r.as_integer())
            .unwrap_or(0)
    }
}
