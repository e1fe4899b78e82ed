//! Standard security handler: password protection for documents.
//!
//! Implements the standard security handler of ISO 32000-1 Section 7.6
//! and the AES-256 extension of ISO 32000-2:
//!
//! - RC4 with 40-bit or 128-bit keys (V1/V2, read and write)
//! - AES-128 in CBC mode (V4/R4)
//! - AES-256 in CBC mode with the hardened R6 key derivation (V5/R6)
//!
//! Reading goes through [`EncryptionHandler`]: passwords are checked
//! against the user slot first and the owner slot second, matching how
//! viewers treat either password as sufficient to open a file. Writing
//! goes through [`EncryptDictBuilder`], which emits the /Encrypt
//! dictionary and an [`EncryptionWriteHandler`] for the serializer.
//!
//! Certificate-based (public key) security handlers are not supported.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::object::Object;

mod aes;
mod algorithms;
mod handler;
mod ops;
mod rc4;
mod write_handler;

pub use handler::EncryptionHandler;
pub use ops::{decrypt, protect, remove_password};
pub use write_handler::{EncryptDictBuilder, EncryptionWriteHandler};

pub(crate) use algorithms::random_bytes;

/// Cipher selected by the V, R, and crypt filter entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with a 40-bit key (V=1, R=2)
    Rc4_40,
    /// RC4 with a 128-bit key (V=2, R=3)
    Rc4_128,
    /// AES-128 in CBC mode (V=4, R=4)
    Aes128,
    /// AES-256 in CBC mode (V=5, R=6)
    Aes256,
}

impl Algorithm {
    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// Whether this is an AES cipher (per-object IV, sAlT suffix in key
    /// derivation).
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

/// Parsed /Encrypt dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// /Filter, the security handler name
    pub filter: String,
    /// /V
    pub version: u32,
    /// /R
    pub revision: u32,
    /// /Length in bits, when present
    pub length: Option<u32>,
    /// /O
    pub owner_entry: Vec<u8>,
    /// /U
    pub user_entry: Vec<u8>,
    /// /OE (R5/R6)
    pub owner_key: Option<Vec<u8>>,
    /// /UE (R5/R6)
    pub user_key: Option<Vec<u8>>,
    /// /Perms (R5/R6)
    pub perms: Option<Vec<u8>>,
    /// /P
    pub permissions: i32,
    /// /EncryptMetadata, true when absent
    pub encrypt_metadata: bool,
    /// CFM of the stream crypt filter, for V>=4
    pub stream_filter_method: Option<String>,
}

impl EncryptDict {
    /// Parse the /Encrypt dictionary.
    pub fn from_dict(dict: &HashMap<String, Object>) -> Result<Self> {
        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| Error::Encryption("/Encrypt has no /Filter name".to_string()))?
            .to_string();

        let version = require_int(dict, "V")? as u32;
        let revision = require_int(dict, "R")? as u32;
        let permissions = require_int(dict, "P")? as i32;

        let owner_entry = require_string(dict, "O")?;
        let user_entry = require_string(dict, "U")?;

        let expected = if revision >= 5 { 48 } else { 32 };
        if owner_entry.len() < expected || user_entry.len() < expected {
            return Err(Error::Encryption(format!(
                "/O and /U must hold at least {} bytes at R{}",
                expected, revision
            )));
        }

        let length = dict.get("Length").and_then(|o| o.as_integer()).map(|v| v as u32);
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let owner_key = dict.get("OE").and_then(|o| o.as_string()).map(<[u8]>::to_vec);
        let user_key = dict.get("UE").and_then(|o| o.as_string()).map(<[u8]>::to_vec);
        let perms = dict.get("Perms").and_then(|o| o.as_string()).map(<[u8]>::to_vec);

        let stream_filter_method = lookup_stream_filter_method(dict);

        Ok(Self {
            filter,
            version,
            revision,
            length,
            owner_entry,
            user_entry,
            owner_key,
            user_key,
            perms,
            permissions,
            encrypt_metadata,
            stream_filter_method,
        })
    }

    /// Map V, R, and the crypt filter method onto a cipher.
    pub fn algorithm(&self) -> Result<Algorithm> {
        match self.version {
            1 => Ok(Algorithm::Rc4_40),
            2 => {
                if self.key_length_bytes() <= 5 {
                    Ok(Algorithm::Rc4_40)
                } else {
                    Ok(Algorithm::Rc4_128)
                }
            },
            4 => match self.stream_filter_method.as_deref() {
                Some("AESV2") | None => Ok(Algorithm::Aes128),
                Some("V2") => Ok(Algorithm::Rc4_128),
                Some(other) => Err(Error::Encryption(format!(
                    "unsupported crypt filter method /{}",
                    other
                ))),
            },
            5 => match self.stream_filter_method.as_deref() {
                Some("AESV3") | None => Ok(Algorithm::Aes256),
                Some(other) => Err(Error::Encryption(format!(
                    "unsupported crypt filter method /{}",
                    other
                ))),
            },
            v => Err(Error::Encryption(format!(
                "unsupported encryption version V={} (R={})",
                v, self.revision
            ))),
        }
    }

    /// Effective key length in bytes, falling back to the per-version
    /// default when /Length is absent.
    pub fn key_length_bytes(&self) -> usize {
        match self.length {
            Some(bits) => (bits / 8) as usize,
            None => match self.version {
                1 => 5,
                5 => 32,
                _ => 16,
            },
        }
    }
}

fn require_int(dict: &HashMap<String, Object>, key: &str) -> Result<i64> {
    dict.get(key)
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::Encryption(format!("/Encrypt has no /{} integer", key)))
}

fn require_string(dict: &HashMap<String, Object>, key: &str) -> Result<Vec<u8>> {
    dict.get(key)
        .and_then(|o| o.as_string())
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::Encryption(format!("/Encrypt has no /{} string", key)))
}

/// Resolve /StmF through /CF to the named filter's /CFM.
fn lookup_stream_filter_method(dict: &HashMap<String, Object>) -> Option<String> {
    let cf = dict.get("CF")?.as_dict()?;
    let filter_name = dict
        .get("StmF")
        .and_then(|f| f.as_name())
        .unwrap_or("StdCF");
    let method = cf.get(filter_name)?.as_dict()?.get("CFM")?.as_name()?;
    Some(method.to_string())
}

/// User access permissions carried in /P.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    bits: i32,
}

impl Permissions {
    /// Wrap a raw /P value.
    pub fn from_bits(bits: i32) -> Self {
        Self { bits }
    }

    /// Everything allowed. The low two bits are reserved and stay zero.
    pub fn all() -> Self {
        Self { bits: -4 }
    }

    /// The raw /P value.
    pub fn bits(&self) -> i32 {
        self.bits
    }

    /// Printing permitted.
    pub fn can_print(&self) -> bool {
        (self.bits & (1 << 2)) != 0
    }

    /// Content changes permitted.
    pub fn can_modify(&self) -> bool {
        (self.bits & (1 << 3)) != 0
    }

    /// Text and graphics extraction permitted.
    pub fn can_copy(&self) -> bool {
        (self.bits & (1 << 4)) != 0
    }

    /// Annotation and form changes permitted.
    pub fn can_annotate(&self) -> bool {
        (self.bits & (1 << 5)) != 0
    }
}

// ============================================================================
// Tests
// ============================================================================
