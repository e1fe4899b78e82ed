//! Write-side encryption: building a fresh /Encrypt dictionary and
//! encrypting objects as they are serialized.
//!
//! [`EncryptDictBuilder`] produces the dictionary entries plus an
//! [`EncryptionWriteHandler`] holding the matching file key. The handler
//! then encrypts each string and stream with its per-object key.

use std::collections::HashMap;

use super::algorithms;
use super::{aes, rc4, Algorithm};
use crate::error::{Error, Result};
use crate::object::Object;

/// Encrypts strings and streams during serialization.
#[derive(Debug)]
pub struct EncryptionWriteHandler {
    file_key: Vec<u8>,
    algorithm: Algorithm,
    revision: u32,
}

impl EncryptionWriteHandler {
    fn new(file_key: Vec<u8>, algorithm: Algorithm, revision: u32) -> Self {
        Self {
            file_key,
            algorithm,
            revision,
        }
    }

    /// The cipher in use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Encrypt a string belonging to object `obj_num`/`gen_num`.
    pub fn encrypt_string(&self, data: &[u8], obj_num: u32, gen_num: u32) -> Result<Vec<u8>> {
        self.encrypt(data, obj_num, gen_num)
    }

    /// Encrypt stream data belonging to object `obj_num`/`gen_num`.
    ///
    /// For AES a random IV is generated and stored ahead of the
    /// ciphertext.
    pub fn encrypt_stream(&self, data: &[u8], obj_num: u32, gen_num: u32) -> Result<Vec<u8>> {
        self.encrypt(data, obj_num, gen_num)
    }

    fn encrypt(&self, data: &[u8], obj_num: u32, gen_num: u32) -> Result<Vec<u8>> {
        let key = algorithms::object_key(
            &self.file_key,
            self.revision,
            self.algorithm.is_aes(),
            obj_num,
            gen_num,
        );

        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => Ok(rc4::rc4_crypt(&key, data)),
            Algorithm::Aes128 | Algorithm::Aes256 => {
                let mut iv = [0u8; aes::BLOCK_SIZE];
                iv.copy_from_slice(&algorithms::random_bytes(aes::BLOCK_SIZE));

                let ciphertext = match self.algorithm {
                    Algorithm::Aes128 => aes::aes128_encrypt(&key, &iv, data)?,
                    _ => aes::aes256_encrypt(&key, &iv, data)?,
                };

                let mut out = iv.to_vec();
                out.extend_from_slice(&ciphertext);
                Ok(out)
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn file_key(&self) -> &[u8] {
        &self.file_key
    }
}

/// Assembles the /Encrypt dictionary for a document being protected.
pub struct EncryptDictBuilder {
    algorithm: Algorithm,
    user_password: Vec<u8>,
    owner_password: Vec<u8>,
    permissions: i32,
    encrypt_metadata: bool,
}

impl EncryptDictBuilder {
    /// Start a builder for the given cipher. Permissions default to
    /// everything allowed and metadata is encrypted.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            user_password: Vec::new(),
            owner_password: Vec::new(),
            permissions: super::Permissions::all().bits(),
            encrypt_metadata: true,
        }
    }

    /// The password that opens the document.
    pub fn user_password(mut self, password: &[u8]) -> Self {
        self.user_password = password.to_vec();
        self
    }

    /// The password that bypasses permission restrictions. Empty means
    /// the user password fills both roles.
    pub fn owner_password(mut self, password: &[u8]) -> Self {
        self.owner_password = password.to_vec();
        self
    }

    /// Permission bits for the /P entry.
    pub fn permissions(mut self, bits: i32) -> Self {
        self.permissions = bits;
        self
    }

    /// Build the dictionary entries and the matching write handler.
    ///
    /// `file_id` is the first element of the trailer /ID array, which
    /// feeds key derivation for the RC4 and AES-128 revisions.
    pub fn build(self, file_id: &[u8]) -> Result<(HashMap<String, Object>, EncryptionWriteHandler)> {
        let (version, revision, length_bits) = match self.algorithm {
            Algorithm::Rc4_40 => (1, 2, 40),
            Algorithm::Rc4_128 => (2, 3, 128),
            Algorithm::Aes128 => (4, 4, 128),
            Algorithm::Aes256 => (5, 6, 256),
        };

        let mut dict = HashMap::new();
        dict.insert("Filter".to_string(), Object::Name("Standard".to_string()));
        dict.insert("V".to_string(), Object::Integer(version));
        dict.insert("R".to_string(), Object::Integer(revision as i64));
        dict.insert("Length".to_string(), Object::Integer(length_bits));
        dict.insert("P".to_string(), Object::Integer(self.permissions as i64));

        let file_key = if revision >= 5 {
            let file_key = algorithms::generate_file_key();
            let values = algorithms::build_r6_values(
                &self.user_password,
                &self.owner_password,
                &file_key,
                self.permissions,
                self.encrypt_metadata,
            )?;

            dict.insert("O".to_string(), Object::String(values.owner_entry));
            dict.insert("U".to_string(), Object::String(values.user_entry));
            dict.insert("OE".to_string(), Object::String(values.owner_key));
            dict.insert("UE".to_string(), Object::String(values.user_key));
            dict.insert("Perms".to_string(), Object::String(values.perms));
            file_key.to_vec()
        } else {
            let key_length = (length_bits / 8) as usize;
            let owner_entry = algorithms::compute_owner_entry(
                &self.owner_password,
                &self.user_password,
                revision,
                key_length,
            );
            let file_key = algorithms::compute_encryption_key(
                &self.user_password,
                &owner_entry,
                self.permissions,
                file_id,
                revision,
                key_length,
                self.encrypt_metadata,
            );
            let user_entry = algorithms::compute_user_entry(&file_key, file_id, revision);

            dict.insert("O".to_string(), Object::String(owner_entry));
            dict.insert("U".to_string(), Object::String(user_entry));
            file_key
        };

        if version >= 4 {
            let method = match self.algorithm {
                Algorithm::Aes128 => "AESV2",
                Algorithm::Aes256 => "AESV3",
                _ => {
                    return Err(Error::Encryption(
                        "crypt filters only apply to AES encryption".to_string(),
                    ));
                },
            };

            let mut std_cf = HashMap::new();
            std_cf.insert("CFM".to_string(), Object::Name(method.to_string()));
            std_cf.insert("AuthEvent".to_string(), Object::Name("DocOpen".to_string()));
            std_cf.insert(
                "Length".to_string(),
                Object::Integer((length_bits / 8) as i64),
            );

            let mut cf = HashMap::new();
            cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));

            dict.insert("CF".to_string(), Object::Dictionary(cf));
            dict.insert("StmF".to_string(), Object::Name("StdCF".to_string()));
            dict.insert("StrF".to_string(), Object::Name("StdCF".to_string()));
            if !self.encrypt_metadata {
                dict.insert("EncryptMetadata".to_string(), Object::Boolean(false));
            }
        }

        let handler = EncryptionWriteHandler::new(file_key, self.algorithm, revision);
        Ok((dict, handler))
    }
}

// ============================================================================
// Tests
// ============================================================================
