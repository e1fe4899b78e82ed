//! Incremental-update signing flow.
//!
//! The appended revision carries three things: the signature dictionary
//! (written as raw bytes so its /ByteRange and /Contents fields keep a
//! fixed, patchable width), a combined signature field and widget
//! annotation, and overrides hooking both into the first page's /Annots
//! and the catalog's /AcroForm. Offsets only exist once the revision is
//! serialized, so /ByteRange and /Contents are patched in place
//! afterwards, then the digest is taken and the CMS blob dropped into
//! the placeholder.

use super::{byterange, cms, SignerInfo};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::{IncrementalUpdate, ObjectSerializer};
use crate::xref::find_subslice;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Write as _;

/// DER capacity reserved for the CMS blob. Generous for an RSA-4096
/// signer with a three-certificate chain.
const SIGNATURE_CAPACITY: usize = 8192;

/// Width of the /ByteRange value slot. Four offsets of a sub-terabyte
/// file fit with room to spare; the rest is space padding.
const BYTE_RANGE_SLOT: usize = 48;

/// Sign the document, returning the complete signed file.
///
/// `private_key_der` is an RSA key in PKCS#8 or PKCS#1 DER;
/// `certificates_der` is the chain with the signer's certificate first.
/// The input document is not modified, and no partial output exists on
/// error.
pub fn sign(
    doc: &mut Document,
    signer: &SignerInfo,
    private_key_der: &[u8],
    certificates_der: &[Vec<u8>],
) -> Result<Vec<u8>> {
    if doc.is_encrypted() {
        return Err(Error::SigningFailure(
            "document is encrypted; remove the password before signing".to_string(),
        ));
    }
    let private_key = cms::decode_private_key(private_key_der)?;
    if certificates_der.is_empty() {
        return Err(Error::SigningFailure("certificate chain is empty".to_string()));
    }

    let root_ref = trailer_root(doc)?;
    let page_ref = doc.page(0)?.reference;
    let base_len = doc.raw_bytes().len();

    let mut update = IncrementalUpdate::new(doc)?;
    let sig_ref = ObjectRef::new(update.next_object_id(), 0);
    let field_ref = ObjectRef::new(update.next_object_id(), 0);

    update.add_raw_object(sig_ref, signature_dict_body(signer));
    update.add_object(
        field_ref,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Annot")),
            ("Subtype", ObjectSerializer::name("Widget")),
            ("FT", ObjectSerializer::name("Sig")),
            ("T", ObjectSerializer::string("Signature1")),
            ("V", Object::Reference(sig_ref)),
            ("Rect", ObjectSerializer::rect(470.0, 640.0, 100.0, 200.0)),
            // Print flag, so viewers render the widget on paper too
            ("F", ObjectSerializer::integer(132)),
            ("P", Object::Reference(page_ref)),
        ]),
    );
    attach_widget(doc, &mut update, page_ref, field_ref)?;
    attach_form(doc, &mut update, root_ref, field_ref)?;

    let mut bytes = update.finish()?;

    // The placeholder's position is only known in the serialized file
    let contents_offset = byterange::find_contents_start(&bytes, base_len).ok_or_else(|| {
        Error::SigningFailure("signature placeholder missing from output".to_string())
    })?;
    let placeholder_len = byterange::placeholder_len(SIGNATURE_CAPACITY);
    let range = byterange::compute(bytes.len(), contents_offset, placeholder_len);
    byterange::validate(&range, bytes.len())?;
    patch_byte_range(&mut bytes, base_len, &range)?;

    let digest = Sha256::digest(&byterange::signed_bytes(&bytes, &range)?);
    let blob = cms::build_signed_data(&digest, Utc::now(), &private_key, certificates_der)?;
    byterange::patch_contents(&mut bytes, contents_offset, placeholder_len, &to_hex(&blob))?;

    Ok(bytes)
}

/// Recompute the digest a signed file claims to cover and compare it
/// against the message-digest attribute inside its CMS blob.
///
/// This checks byte-range integrity only, not the cryptographic
/// signature or the certificate chain.
pub fn verify_byte_range_digest(data: &[u8]) -> Result<bool> {
    let range = byterange::parse_last(data)?;
    byterange::validate(&range, data.len())?;

    let gap = &data[range[1] as usize..range[2] as usize];
    let blob = decode_hex_string(gap)?;
    let expected = cms::extract_message_digest(&blob)?;

    let digest = Sha256::digest(&byterange::signed_bytes(data, &range)?);
    Ok(expected == digest.as_slice())
}

/// Serialized signature dictionary with fixed-width /ByteRange and
/// /Contents slots.
fn signature_dict_body(signer: &SignerInfo) -> Vec<u8> {
    let mut body = Vec::new();
    let _ = write!(body, "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached");
    let _ = write!(body, "\n/ByteRange {:<width$}", "[0 0 0 0]", width = BYTE_RANGE_SLOT);
    let _ = write!(body, "\n/Contents {}", byterange::zero_placeholder(SIGNATURE_CAPACITY));
    let _ = write!(body, "\n/Name ({})", escape_literal(&signer.name));
    let _ = write!(body, "\n/M (D:{}+00'00')", Utc::now().format("%Y%m%d%H%M%S"));
    if !signer.reason.is_empty() {
        let _ = write!(body, "\n/Reason ({})", escape_literal(&signer.reason));
    }
    if !signer.location.is_empty() {
        let _ = write!(body, "\n/Location ({})", escape_literal(&signer.location));
    }
    if !signer.contact.is_empty() {
        let _ = write!(body, "\n/ContactInfo ({})", escape_literal(&signer.contact));
    }
    let _ = write!(body, " >>");
    body
}

/// Append the widget to the page's /Annots, overriding either the page
/// or a shared annotation array, whichever actually holds the list.
fn attach_widget(
    doc: &mut Document,
    update: &mut IncrementalUpdate,
    page_ref: ObjectRef,
    field_ref: ObjectRef,
) -> Result<()> {
    let mut page_dict = load_dict(doc, page_ref)?;
    match page_dict.get("Annots") {
        Some(Object::Reference(annots_ref)) => {
            let annots_ref = *annots_ref;
            let mut annots = match doc.load_object(annots_ref)? {
                Object::Array(items) => items,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Array".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            annots.push(Object::Reference(field_ref));
            update.add_object(annots_ref, Object::Array(annots));
        },
        Some(Object::Array(items)) => {
            let mut annots = items.clone();
            annots.push(Object::Reference(field_ref));
            page_dict.insert("Annots".to_string(), Object::Array(annots));
            update.add_object(page_ref, Object::Dictionary(page_dict));
        },
        _ => {
            page_dict.insert(
                "Annots".to_string(),
                Object::Array(vec![Object::Reference(field_ref)]),
            );
            update.add_object(page_ref, Object::Dictionary(page_dict));
        },
    }
    Ok(())
}

/// Hook the field into the catalog's /AcroForm, merging with an
/// existing form dictionary when there is one.
fn attach_form(
    doc: &mut Document,
    update: &mut IncrementalUpdate,
    root_ref: ObjectRef,
    field_ref: ObjectRef,
) -> Result<()> {
    let mut catalog = load_dict(doc, root_ref)?;
    let mut form = match catalog.get("AcroForm") {
        Some(form_obj) => match doc.resolve(form_obj)? {
            Object::Dictionary(d) => d,
            _ => Default::default(),
        },
        None => Default::default(),
    };

    let mut fields = match form.get("Fields") {
        Some(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    fields.push(Object::Reference(field_ref));
    form.insert("Fields".to_string(), Object::Array(fields));
    // Bit 1 SignaturesExist, bit 2 AppendOnly
    form.insert("SigFlags".to_string(), Object::Integer(3));

    catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
    update.add_object(root_ref, Object::Dictionary(catalog));
    Ok(())
}

/// Overwrite the reserved /ByteRange slot in the appended revision.
fn patch_byte_range(bytes: &mut [u8], from: usize, range: &[i64; 4]) -> Result<()> {
    let key_pos = from
        + find_subslice(&bytes[from..], b"/ByteRange ").ok_or_else(|| {
            Error::SigningFailure("byte range slot missing from output".to_string())
        })?;
    let slot_start = key_pos + b"/ByteRange ".len();

    let formatted = byterange::format(range);
    if formatted.len() > BYTE_RANGE_SLOT {
        return Err(Error::SigningFailure(format!(
            "byte range {} overflows its {}-byte slot",
            formatted, BYTE_RANGE_SLOT
        )));
    }

    let slot = &mut bytes[slot_start..slot_start + BYTE_RANGE_SLOT];
    slot[..formatted.len()].copy_from_slice(formatted.as_bytes());
    slot[formatted.len()..].fill(b' ');
    Ok(())
}

fn trailer_root(doc: &Document) -> Result<ObjectRef> {
    doc.trailer()
        .as_dict()
        .and_then(|d| d.get("Root"))
        .and_then(|r| r.as_reference())
        .ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: "trailer has no /Root reference".to_string(),
        })
}

fn load_dict(
    doc: &mut Document,
    obj_ref: ObjectRef,
) -> Result<std::collections::HashMap<String, Object>> {
    match doc.load_object(obj_ref)? {
        Object::Dictionary(d) => Ok(d),
        other => Err(Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            },
            _ => out.push(c),
        }
    }
    out
}

fn to_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Hex string between angle brackets, whitespace tolerated.
fn decode_hex_string(raw: &[u8]) -> Result<Vec<u8>> {
    let inner = raw
        .strip_prefix(b"<")
        .and_then(|r| r.strip_suffix(b">"))
        .ok_or_else(|| Error::SigningFailure("/Contents is not a hex string".to_string()))?;

    let digits: Vec<u8> = inner
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0])?;
        let lo = if pair.len() == 2 { hex_value(pair[1])? } else { 0 };
        out.push(hi << 4 | lo);
    }
    Ok(out)
}

fn hex_value(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::SigningFailure(format!("bad hex digit {:#04x}", b))),
    }
}

// ============================================================================
// Tests
// ============================================================================
