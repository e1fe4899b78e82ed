//! Password operations on whole documents.
//!
//! [`protect`] and [`decrypt`] sit on top of the read and write
//! handlers: protect re-serializes the document with a fresh /Encrypt
//! dictionary, decrypt authenticates and re-serializes as plaintext.
//! Both are full rewrites; incremental history does not survive a
//! password change.

use super::{Algorithm, EncryptDictBuilder, Permissions};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::writer::DocumentWriter;

/// Default /P for protected output: printing allowed, modification
/// denied.
fn default_permissions() -> i32 {
    Permissions::all().bits() & !(1 << 3)
}

/// Encrypt the document with the given cipher and passwords.
///
/// An absent owner password falls back to the user password, matching
/// the standard handler's convention. The source document must already
/// be readable (unencrypted, or authenticated beforehand).
pub fn protect(
    doc: &mut Document,
    algorithm: Algorithm,
    user_password: &[u8],
    owner_password: Option<&[u8]>,
) -> Result<Document> {
    let mut writer = DocumentWriter::from_document(doc)?;
    writer.encrypt(
        EncryptDictBuilder::new(algorithm)
            .user_password(user_password)
            .owner_password(owner_password.unwrap_or(user_password))
            .permissions(default_permissions()),
    )?;

    Document::parse(writer.to_bytes()?)
}

/// Decrypt the document, returning a plaintext copy.
///
/// The password is tried as the user password first, then as the owner
/// password; either grants access. An unencrypted input succeeds as a
/// no-op, returning an equivalent document, so pipelines need not probe
/// for encryption first.
pub fn decrypt(doc: &mut Document, password: &[u8]) -> Result<Document> {
    if !doc.is_encrypted() {
        log::debug!("decrypt called on an unencrypted document, passing through");
        return Document::parse(doc.raw_bytes().clone());
    }

    if !doc.authenticate(password)? {
        return Err(Error::IncorrectPassword);
    }

    // from_document decrypts strings and streams while copying; the
    // output carries no /Encrypt dictionary
    let writer = DocumentWriter::from_document(doc)?;
    Document::parse(writer.to_bytes()?)
}

/// The original tool's "unlock": decrypt and keep the plaintext.
pub fn remove_password(doc: &mut Document, password: &[u8]) -> Result<Document> {
    decrypt(doc, password)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::test_support::{content_of, sample_document};

    fn protect_roundtrip(algorithm: Algorithm) {
        let mut doc = sample_document(2);
        let original: Vec<_> = (0..2).map(|i| content_of(&mut doc, i)).collect();

        let mut locked = protect(&mut doc, algorithm, b"pw", None).unwrap();
        assert!(locked.is_encrypted());
        assert!(locked.needs_password());

        let mut plain = decrypt(&mut locked, b"pw").unwrap();
        assert!(!plain.is_encrypted());
        assert_eq!(plain.page_count().unwrap(), 2);
        for (i, content) in original.iter().enumerate() {
            assert_eq!(&content_of(&mut plain, i), content);
        }
    }

    #[test]
    fn test_protect_decrypt_rc4() {
        protect_roundtrip(Algorithm::Rc4_128);
    }

    #[test]
    fn test_protect_decrypt_aes128() {
        protect_roundtrip(Algorithm::Aes128);
    }

    #[test]
    fn test_protect_decrypt_aes256() {
        protect_roundtrip(Algorithm::Aes256);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let mut doc = sample_document(1);
        let mut locked = protect(&mut doc, Algorithm::Aes128, b"pw", None).unwrap();
        match decrypt(&mut locked, b"nope") {
            Err(Error::IncorrectPassword) => {},
            other => panic!("expected IncorrectPassword, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_password_also_opens() {
        let mut doc = sample_document(1);
        let mut locked = protect(&mut doc, Algorithm::Rc4_128, b"user", Some(b"owner")).unwrap();
        let plain = decrypt(&mut locked, b"owner").unwrap();
        assert!(!plain.is_encrypted());
    }

    #[test]
    fn test_decrypt_unencrypted_is_noop_success() {
        let mut doc = sample_document(2);
        let mut out = decrypt(&mut doc, b"anything").unwrap();
        assert_eq!(out.page_count().unwrap(), 2);
        assert_eq!(content_of(&mut out, 0), content_of(&mut doc, 0));
    }

    #[test]
    fn test_default_permissions_deny_modification() {
        let bits = super::default_permissions();
        let perms = Permissions::from_bits(bits);
        assert!(perms.can_print());
        assert!(!perms.can_modify());
    }

    #[test]
    fn test_remove_password_strips_encrypt_dict() {
        let mut doc = sample_document(1);
        let mut locked = protect(&mut doc, Algorithm::Aes256, b"s3cret", None).unwrap();
        let plain = remove_password(&mut locked, b"s3cret").unwrap();
        let text = String::from_utf8_lossy(plain.raw_bytes());
        assert!(!text.contains("/Encrypt"));
        assert!(text.contains("page-1"));
    }
}
