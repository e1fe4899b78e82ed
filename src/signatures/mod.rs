//! Detached PKCS#7 digital signatures.
//!
//! Signing appends one incremental revision carrying a signature
//! dictionary, a signature form field, and an /AcroForm hook in the
//! catalog. The signature value is a detached CMS SignedData blob over
//! the SHA-256 digest of the whole file minus the /Contents placeholder,
//! as described by the dictionary's /ByteRange.
//!
//! The flow is split across three submodules: [`byterange`] handles the
//! placeholder geometry and offset patching, [`cms`] builds the DER
//! SignedData structure, and [`signer`] drives the incremental update.

mod byterange;
mod cms;
mod signer;

pub use signer::{sign, verify_byte_range_digest};

/// Identity and context recorded in the signature dictionary.
///
/// Only `name` is required; the free-text fields default to empty and
/// are omitted from the output when blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo {
    pub name: String,
    pub reason: String,
    pub location: String,
    pub contact: String,
}

impl SignerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: String::new(),
            location: String::new(),
            contact: String::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }
}
