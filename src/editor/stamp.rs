//! Signature metadata stamping.
//!
//! Writes signer details into the document information dictionary and
//! nothing else. This is the explicitly weaker sibling of
//! [`signatures::sign`]: no digest, no CMS blob, no tamper evidence.
//! It exists as its own named operation precisely so that a failed
//! cryptographic signing can never silently degrade into it.
//!
//! [`signatures::sign`]: crate::signatures::sign

use crate::document::Document;
use crate::error::Result;
use crate::signatures::SignerInfo;
use crate::writer::{DocumentWriter, ObjectSerializer};

/// Producer string recorded on stamped documents.
const STAMP_PRODUCER: &str = "pdf_smith digital signature";

/// Record signer metadata in /Info via a full rewrite.
pub fn stamp_signature_metadata(doc: &mut Document, signer: &SignerInfo) -> Result<Document> {
    let subject = if signer.reason.is_empty() {
        "Digitally Signed Document".to_string()
    } else {
        signer.reason.clone()
    };

    let mut writer = DocumentWriter::from_document(doc)?;
    writer.merge_info(vec![
        ("Producer", ObjectSerializer::string(STAMP_PRODUCER)),
        (
            "Title",
            ObjectSerializer::string(&format!("Signed Document - {}", signer.name)),
        ),
        ("Author", ObjectSerializer::string(&signer.name)),
        ("Subject", ObjectSerializer::string(&subject)),
    ]);

    Document::parse(writer.to_bytes()?)
}
