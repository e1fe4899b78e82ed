//! Signing end to end: incremental update shape, byte-range digest
//! integrity, and the metadata stamp as a distinct, weaker operation.

mod common;

use common::sample_document;
use pdf_smith::editor::stamp_signature_metadata;
use pdf_smith::signatures::{sign, verify_byte_range_digest, SignerInfo};
use pdf_smith::{Document, Error};

const TEST_KEY: &[u8] = include_bytes!("data/signer_key_pkcs8.der");
const TEST_CERT: &[u8] = include_bytes!("data/signer_cert.der");

fn signer() -> SignerInfo {
    SignerInfo::new("Integration Signer")
        .reason("Release approval")
        .location("Berlin")
        .contact("signer@example.com")
}

#[test]
fn test_sign_appends_revision() {
    let mut doc = sample_document(3);
    let original_len = doc.raw_bytes().len();
    let signed = sign(&mut doc, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();

    // Append-only: the original file is a byte-for-byte prefix
    assert_eq!(&signed[..original_len], &doc.raw_bytes()[..]);

    let mut reparsed = Document::parse(signed).unwrap();
    assert_eq!(reparsed.page_count().unwrap(), 3);
}

#[test]
fn test_byte_range_digest_verifies() {
    let mut doc = sample_document(1);
    let signed = sign(&mut doc, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();
    assert!(verify_byte_range_digest(&signed).unwrap());
}

#[test]
fn test_any_tamper_is_detected() {
    let mut doc = sample_document(1);
    let signed = sign(&mut doc, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();

    // One position in each covered range; the placeholder gap between
    // them is deliberately not covered
    for pos in [10, signed.len() - 5] {
        let mut tampered = signed.clone();
        tampered[pos] ^= 0x01;
        let intact = verify_byte_range_digest(&tampered).unwrap_or(false);
        assert!(!intact, "flip at {} went unnoticed", pos);
    }
}

#[test]
fn test_signed_file_saves_and_verifies_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signed.pdf");

    let mut doc = sample_document(2);
    let signed = sign(&mut doc, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();
    std::fs::write(&path, &signed).unwrap();

    let read_back = std::fs::read(&path).unwrap();
    assert!(verify_byte_range_digest(&read_back).unwrap());
    assert_eq!(Document::open(&path).unwrap().version(), doc.version());
}

#[test]
fn test_signature_metadata_lands_in_dictionary() {
    let mut doc = sample_document(1);
    let signed = sign(&mut doc, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();
    let text = String::from_utf8_lossy(&signed);

    assert!(text.contains("/SubFilter /adbe.pkcs7.detached"));
    assert!(text.contains("/Name (Integration Signer)"));
    assert!(text.contains("/Reason (Release approval)"));
    assert!(text.contains("/Location (Berlin)"));
    assert!(text.contains("/ContactInfo (signer@example.com)"));
}

#[test]
fn test_sign_rejects_encrypted_document() {
    let mut doc = sample_document(1);
    let mut locked = pdf_smith::encryption::protect(
        &mut doc,
        pdf_smith::encryption::Algorithm::Aes256,
        b"pw",
        None,
    )
    .unwrap();

    match sign(&mut locked, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]) {
        Err(Error::SigningFailure(_)) => {},
        other => panic!("expected SigningFailure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_failed_signing_leaves_document_untouched() {
    let mut doc = sample_document(1);
    let before = doc.raw_bytes().clone();
    assert!(sign(&mut doc, &signer(), b"garbage key", &[TEST_CERT.to_vec()]).is_err());
    assert_eq!(doc.raw_bytes(), &before);
}

#[test]
fn test_stamp_is_not_a_signature() {
    let mut doc = sample_document(1);
    let stamped = stamp_signature_metadata(&mut doc, &signer()).unwrap();
    let text = String::from_utf8_lossy(stamped.raw_bytes());

    // Info fields present, signature machinery absent
    assert!(text.contains("Signed Document - Integration Signer"));
    assert!(!text.contains("/ByteRange"));
    assert!(!text.contains("/AcroForm"));
    assert!(verify_byte_range_digest(stamped.raw_bytes()).is_err());
}

#[test]
fn test_stamped_then_signed() {
    let mut doc = sample_document(2);
    let mut stamped = stamp_signature_metadata(&mut doc, &signer()).unwrap();
    let signed = sign(&mut stamped, &signer(), TEST_KEY, &[TEST_CERT.to_vec()]).unwrap();

    assert!(verify_byte_range_digest(&signed).unwrap());
    let mut reparsed = Document::parse(signed).unwrap();
    assert_eq!(reparsed.page_count().unwrap(), 2);
}
