//! Password protection end to end: protect, reopen from disk,
//! authenticate, decrypt, for every supported cipher.

mod common;

use common::{marker_of, sample_document};
use pdf_smith::encryption::{decrypt, protect, remove_password, Algorithm};
use pdf_smith::{Document, Error};

fn roundtrip_through_disk(algorithm: Algorithm) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.pdf");

    let mut doc = sample_document(3);
    let locked = protect(&mut doc, algorithm, b"user-pw", Some(b"owner-pw")).unwrap();
    std::fs::write(&path, locked.raw_bytes()).unwrap();

    let mut reopened = Document::open(&path).unwrap();
    assert!(reopened.is_encrypted());
    assert!(reopened.needs_password());

    let mut plain = decrypt(&mut reopened, b"user-pw").unwrap();
    assert!(!plain.is_encrypted());
    assert_eq!(plain.page_count().unwrap(), 3);
    for i in 0..3 {
        assert_eq!(marker_of(&mut plain, i), format!("page-{}", i + 1));
    }
}

#[test]
fn test_rc4_40_roundtrip() {
    roundtrip_through_disk(Algorithm::Rc4_40);
}

#[test]
fn test_rc4_128_roundtrip() {
    roundtrip_through_disk(Algorithm::Rc4_128);
}

#[test]
fn test_aes_128_roundtrip() {
    roundtrip_through_disk(Algorithm::Aes128);
}

#[test]
fn test_aes_256_roundtrip() {
    roundtrip_through_disk(Algorithm::Aes256);
}

#[test]
fn test_both_passwords_open() {
    let mut doc = sample_document(1);
    let locked = protect(&mut doc, Algorithm::Aes256, b"user", Some(b"owner")).unwrap();

    let mut via_user = Document::parse(locked.raw_bytes().clone()).unwrap();
    assert!(decrypt(&mut via_user, b"user").is_ok());

    let mut via_owner = Document::parse(locked.raw_bytes().clone()).unwrap();
    assert!(decrypt(&mut via_owner, b"owner").is_ok());
}

#[test]
fn test_wrong_password_fails() {
    let mut doc = sample_document(1);
    let mut locked = protect(&mut doc, Algorithm::Rc4_128, b"right", None).unwrap();
    match decrypt(&mut locked, b"wrong") {
        Err(Error::IncorrectPassword) => {},
        other => panic!("expected IncorrectPassword, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_decrypt_unencrypted_is_noop() {
    let mut doc = sample_document(2);
    let mut out = decrypt(&mut doc, b"whatever").unwrap();
    assert!(!out.is_encrypted());
    assert_eq!(out.page_count().unwrap(), 2);
}

#[test]
fn test_remove_password_output_opens_without_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unlocked.pdf");

    let mut doc = sample_document(2);
    let mut locked = protect(&mut doc, Algorithm::Aes128, b"pw", None).unwrap();
    let plain = remove_password(&mut locked, b"pw").unwrap();
    std::fs::write(&path, plain.raw_bytes()).unwrap();

    let mut reopened = Document::open(&path).unwrap();
    assert!(!reopened.is_encrypted());
    assert_eq!(marker_of(&mut reopened, 1), "page-2");
}

#[test]
fn test_encrypted_page_content_is_not_plaintext() {
    let mut doc = sample_document(1);
    let locked = protect(&mut doc, Algorithm::Aes128, b"pw", None).unwrap();
    // The marker text must not survive in the clear
    let raw = locked.raw_bytes();
    assert!(pdf_smith::Document::parse(raw.clone()).is_ok());
    assert!(!raw.windows(6).any(|w| w == b"page-1"));
}

#[test]
fn test_reprotect_with_different_cipher() {
    let mut doc = sample_document(2);
    let mut rc4 = protect(&mut doc, Algorithm::Rc4_128, b"a", None).unwrap();
    let mut plain = decrypt(&mut rc4, b"a").unwrap();
    let mut aes = protect(&mut plain, Algorithm::Aes256, b"b", None).unwrap();
    let mut out = decrypt(&mut aes, b"b").unwrap();

    assert_eq!(out.page_count().unwrap(), 2);
    assert_eq!(marker_of(&mut out, 0), "page-1");
}
