//! Detached CMS SignedData construction.
//!
//! Builds the PKCS#7 blob that goes into the /Contents placeholder:
//! one SHA-256 SignerInfo identified by issuer and serial of the leaf
//! certificate, signed attributes (content-type, signing-time,
//! message-digest) signed with RSASSA-PKCS1-v1_5, and the full
//! certificate chain embedded. The content itself is detached, only
//! its digest travels in the message-digest attribute.
//!
//! DER is emitted directly with small TLV helpers rather than through
//! an ASN.1 framework; the structure is fixed and shallow enough that
//! the explicit encoding is easier to audit than a derive.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use x509_parser::prelude::parse_x509_certificate;

/// OID 2.16.840.1.101.3.4.2.1, sha256
const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// OID 1.2.840.113549.1.1.1, rsaEncryption
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// OID 1.2.840.113549.1.7.1, id-data
const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];

/// OID 1.2.840.113549.1.7.2, id-signedData
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];

/// OID 1.2.840.113549.1.9.3, content-type attribute
const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];

/// OID 1.2.840.113549.1.9.4, message-digest attribute
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// OID 1.2.840.113549.1.9.5, signing-time attribute
const OID_SIGNING_TIME: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05];

/// Decode an RSA private key from DER, accepting PKCS#8 or PKCS#1.
pub fn decode_private_key(der: &[u8]) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
        .map_err(|e| Error::SigningFailure(format!("cannot decode private key: {}", e)))
}

/// Build the detached SignedData ContentInfo over `digest`.
///
/// `certificates` is the DER chain, leaf first; the SignerInfo points
/// at the leaf by issuer and serial, so key and leaf must match.
pub fn build_signed_data(
    digest: &[u8],
    signing_time: DateTime<Utc>,
    private_key: &RsaPrivateKey,
    certificates: &[Vec<u8>],
) -> Result<Vec<u8>> {
    let leaf = certificates
        .first()
        .ok_or_else(|| Error::SigningFailure("certificate chain is empty".to_string()))?;
    let (_, cert) = parse_x509_certificate(leaf)
        .map_err(|e| Error::SigningFailure(format!("cannot parse signing certificate: {}", e)))?;
    // as_raw gives the complete DER of the Name, outer tag included
    let issuer = cert.tbs_certificate.issuer.as_raw();
    let serial = cert.tbs_certificate.raw_serial();

    // Signed attributes are signed as SET OF (tag 0x31) but embedded
    // with the IMPLICIT [0] tag (0xA0) over the same content
    let attrs = signed_attributes(digest, signing_time);
    let signature = SigningKey::<Sha256>::new(private_key.clone())
        .sign(&tlv(0x31, &attrs))
        .to_vec();

    let mut signer_info = Vec::new();
    signer_info.extend(integer(&[1]));
    signer_info.extend(sequence(&[issuer, &integer(serial)]));
    signer_info.extend(algorithm_identifier(OID_SHA256));
    signer_info.extend(tlv(0xA0, &attrs));
    signer_info.extend(algorithm_identifier(OID_RSA_ENCRYPTION));
    signer_info.extend(tlv(0x04, &signature));
    let signer_info = tlv(0x30, &signer_info);

    let chain: Vec<u8> = certificates.iter().flatten().copied().collect();

    let mut signed_data = Vec::new();
    signed_data.extend(integer(&[1]));
    signed_data.extend(tlv(0x31, &algorithm_identifier(OID_SHA256)));
    // Detached: encapContentInfo names id-data but carries no content
    signed_data.extend(sequence(&[&oid(OID_DATA)]));
    signed_data.extend(tlv(0xA0, &chain));
    signed_data.extend(tlv(0x31, &signer_info));
    let signed_data = tlv(0x30, &signed_data);

    Ok(sequence(&[&oid(OID_SIGNED_DATA), &tlv(0xA0, &signed_data)]))
}

/// Pull the message-digest attribute value back out of a SignedData
/// blob. Verification compares this against a freshly computed digest.
pub fn extract_message_digest(cms: &[u8]) -> Result<Vec<u8>> {
    let pattern = oid(OID_MESSAGE_DIGEST);
    let pos = crate::xref::find_subslice(cms, &pattern)
        .ok_or_else(|| Error::SigningFailure("no message-digest attribute".to_string()))?;

    // The attribute value is SET { OCTET STRING digest }
    let (set_tag, set_content) = read_tlv(cms, pos + pattern.len())?;
    if set_tag != 0x31 {
        return Err(Error::SigningFailure(format!(
            "message-digest attribute holds tag {:#04x}, expected SET",
            set_tag
        )));
    }
    let (octet_tag, value) = read_tlv(set_content, 0)?;
    if octet_tag != 0x04 {
        return Err(Error::SigningFailure(format!(
            "message-digest value has tag {:#04x}, expected OCTET STRING",
            octet_tag
        )));
    }
    Ok(value.to_vec())
}

/// Content of the signed-attributes SET, without the outer tag.
fn signed_attributes(digest: &[u8], signing_time: DateTime<Utc>) -> Vec<u8> {
    let mut attrs = Vec::new();
    attrs.extend(attribute(OID_CONTENT_TYPE, &oid(OID_DATA)));
    attrs.extend(attribute(OID_SIGNING_TIME, &utc_time(signing_time)));
    attrs.extend(attribute(OID_MESSAGE_DIGEST, &tlv(0x04, digest)));
    attrs
}

/// Attribute ::= SEQUENCE { type OID, values SET OF value }
fn attribute(attr_oid: &[u8], value: &[u8]) -> Vec<u8> {
    sequence(&[&oid(attr_oid), &tlv(0x31, value)])
}

/// AlgorithmIdentifier with NULL parameters.
fn algorithm_identifier(alg: &[u8]) -> Vec<u8> {
    sequence(&[&oid(alg), &[0x05, 0x00]])
}

/// UTCTime, YYMMDDHHMMSSZ.
fn utc_time(t: DateTime<Utc>) -> Vec<u8> {
    tlv(0x17, t.format("%y%m%d%H%M%SZ").to_string().as_bytes())
}

fn sequence(items: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    tlv(0x30, &content)
}

fn oid(content: &[u8]) -> Vec<u8> {
    tlv(0x06, content)
}

/// INTEGER from big-endian magnitude bytes, padding when the high bit
/// would flip the sign.
fn integer(value: &[u8]) -> Vec<u8> {
    match value.first() {
        Some(&b) if b & 0x80 != 0 => {
            let mut padded = Vec::with_capacity(value.len() + 1);
            padded.push(0);
            padded.extend_from_slice(value);
            tlv(0x02, &padded)
        },
        _ => tlv(0x02, value),
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = content.len();
    let mut out = vec![tag];
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.extend([0x81, len as u8]);
    } else if len <= 0xFFFF {
        out.extend([0x82, (len >> 8) as u8, len as u8]);
    } else {
        out.extend([0x83, (len >> 16) as u8, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

/// Read the TLV at `pos`, returning the tag and content slice.
fn read_tlv(data: &[u8], pos: usize) -> Result<(u8, &[u8])> {
    let truncated = || Error::SigningFailure("truncated DER structure".to_string());
    let tag = *data.get(pos).ok_or_else(truncated)?;
    let first = *data.get(pos + 1).ok_or_else(truncated)? as usize;

    let (len, header) = if first < 0x80 {
        (first, 2)
    } else {
        let count = first & 0x7F;
        if count == 0 || count > 4 {
            return Err(Error::SigningFailure(format!(
                "unsupported DER length encoding {:#04x}",
                first
            )));
        }
        let mut len = 0usize;
        for i in 0..count {
            len = (len << 8) | *data.get(pos + 2 + i).ok_or_else(truncated)? as usize;
        }
        (len, 2 + count)
    };

    let start = pos + header;
    let end = start.checked_add(len).ok_or_else(truncated)?;
    if end > data.len() {
        return Err(truncated());
    }
    Ok((tag, &data[start..end]))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rsa::traits::PublicKeyParts;
    use sha2::Digest;

    const TEST_KEY: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/signer_key_pkcs8.der"));
    const TEST_CERT: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/signer_cert.der"));

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_decode_private_key_pkcs8() {
        let key = decode_private_key(TEST_KEY).unwrap();
        assert_eq!(key.size(), 256);
    }

    #[test]
    fn test_decode_garbage_key_fails() {
        assert!(decode_private_key(b"not a key").is_err());
    }

    #[test]
    fn test_signed_data_is_content_info() {
        let key = decode_private_key(TEST_KEY).unwrap();
        let digest = Sha256::digest(b"document bytes");
        let cms =
            build_signed_data(&digest, test_time(), &key, &[TEST_CERT.to_vec()]).unwrap();

        // Outermost: SEQUENCE { OID signedData, [0] ... }
        assert_eq!(cms[0], 0x30);
        let (tag, content) = read_tlv(&cms, 0).unwrap();
        assert_eq!(tag, 0x30);
        assert!(content.starts_with(&oid(OID_SIGNED_DATA)));
        // The chain is embedded verbatim
        assert!(crate::xref::find_subslice(&cms, TEST_CERT).is_some());
    }

    #[test]
    fn test_message_digest_roundtrips() {
        let key = decode_private_key(TEST_KEY).unwrap();
        let digest = Sha256::digest(b"some signed bytes").to_vec();
        let cms =
            build_signed_data(&digest, test_time(), &key, &[TEST_CERT.to_vec()]).unwrap();
        assert_eq!(extract_message_digest(&cms).unwrap(), digest);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let key = decode_private_key(TEST_KEY).unwrap();
        let result = build_signed_data(&[0u8; 32], test_time(), &key, &[]);
        assert!(matches!(result, Err(Error::SigningFailure(_))));
    }

    #[test]
    fn test_utc_time_format() {
        assert_eq!(utc_time(test_time()), tlv(0x17, b"260314092653Z"));
    }

    #[test]
    fn test_integer_pads_high_bit() {
        assert_eq!(integer(&[0x7F]), vec![0x02, 0x01, 0x7F]);
        assert_eq!(integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(integer(&[]), vec![0x02, 0x00]);
    }

    proptest! {
        #[test]
        fn prop_tlv_roundtrips(content in proptest::collection::vec(any::<u8>(), 0..600)) {
            let encoded = tlv(0x04, &content);
            let (tag, decoded) = read_tlv(&encoded, 0).unwrap();
            prop_assert_eq!(tag, 0x04);
            prop_assert_eq!(decoded, &content[..]);
        }

        #[test]
        fn prop_tlv_header_is_minimal(len in 0usize..70000) {
            let content = vec![0xAB; len];
            let encoded = tlv(0x30, &content);
            let header = encoded.len() - len;
            let expected = match len {
                0..=0x7F => 2,
                0x80..=0xFF => 3,
                0x100..=0xFFFF => 4,
                _ => 5,
            };
            prop_assert_eq!(header, expected);
        }
    }
}
