//! Read-side decryption handler.
//!
//! Built from a document's /Encrypt dictionary, the handler validates
//! passwords against both the user and owner slots and decrypts strings
//! and stream payloads once a password has been accepted.

use std::collections::HashMap;

use super::algorithms;
use super::{aes, rc4, Algorithm, EncryptDict, Permissions};
use crate::error::{Error, Result};
use crate::object::Object;

/// Decryption state for an encrypted document.
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    dict: EncryptDict,
    file_id: Vec<u8>,
    algorithm: Algorithm,
    /// Set once a password has been accepted
    file_key: Option<Vec<u8>>,
}

impl EncryptionHandler {
    /// Build a handler from the parsed /Encrypt dictionary and the first
    /// element of the trailer /ID array.
    pub fn from_encrypt_dict(dict: &HashMap<String, Object>, file_id: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_dict(dict)?;

        if dict.filter != "Standard" {
            return Err(Error::Encryption(format!(
                "unsupported security handler /{}",
                dict.filter
            )));
        }

        let algorithm = dict.algorithm()?;
        log::info!(
            "document is encrypted with {:?} (V={}, R={})",
            algorithm,
            dict.version,
            dict.revision
        );

        Ok(Self {
            dict,
            file_id,
            algorithm,
            file_key: None,
        })
    }

    /// Try a password against the user slot, then the owner slot.
    ///
    /// On success the file key is retained for later decryption calls.
    pub fn try_password(&mut self, password: &[u8]) -> Result<bool> {
        let key = if self.dict.revision >= 5 {
            self.try_password_r6(password)?
        } else {
            self.try_password_classic(password)
        };

        match key {
            Some(key) => {
                self.file_key = Some(key);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn try_password_classic(&self, password: &[u8]) -> Option<Vec<u8>> {
        if let Some(key) = algorithms::authenticate_user_password(
            password,
            &self.dict.user_entry,
            &self.dict.owner_entry,
            self.dict.permissions,
            &self.file_id,
            self.dict.revision,
            self.dict.key_length_bytes(),
            self.dict.encrypt_metadata,
        ) {
            log::debug!("password accepted in the user slot");
            return Some(key);
        }

        if let Some(key) = algorithms::authenticate_owner_password(
            password,
            &self.dict.user_entry,
            &self.dict.owner_entry,
            self.dict.permissions,
            &self.file_id,
            self.dict.revision,
            self.dict.key_length_bytes(),
            self.dict.encrypt_metadata,
        ) {
            log::debug!("password accepted in the owner slot");
            return Some(key);
        }

        None
    }

    fn try_password_r6(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let user_key = self.dict.user_key.as_deref().ok_or_else(|| {
            Error::Encryption("R5/R6 encryption without a /UE entry".to_string())
        })?;
        let owner_key = self.dict.owner_key.as_deref().ok_or_else(|| {
            Error::Encryption("R5/R6 encryption without an /OE entry".to_string())
        })?;

        let key = match algorithms::authenticate_user_r6(
            password,
            &self.dict.user_entry,
            user_key,
            self.dict.revision,
        )? {
            Some(key) => {
                log::debug!("password accepted in the user slot");
                Some(key)
            },
            None => algorithms::authenticate_owner_r6(
                password,
                &self.dict.owner_entry,
                &self.dict.user_entry,
                owner_key,
                self.dict.revision,
            )?
            .inspect(|_| log::debug!("password accepted in the owner slot")),
        };

        if let (Some(key), Some(perms)) = (&key, &self.dict.perms) {
            match algorithms::verify_perms(perms, key, self.dict.permissions) {
                Ok(true) => {},
                Ok(false) => log::warn!("/Perms block does not match /P, continuing anyway"),
                Err(e) => log::warn!("could not verify /Perms block: {}", e),
            }
        }

        Ok(key)
    }

    /// Whether a password has been accepted.
    pub fn is_authenticated(&self) -> bool {
        self.file_key.is_some()
    }

    /// The cipher this document uses.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The document's permission bits.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.dict.permissions)
    }

    /// The file encryption key, once authenticated.
    pub fn file_key(&self) -> Option<&[u8]> {
        self.file_key.as_deref()
    }

    /// Decrypt stream data belonging to object `obj_num`/`gen_num`.
    ///
    /// For AES the first 16 bytes of `data` are the IV.
    pub fn decrypt_stream(&self, data: &[u8], obj_num: u32, gen_num: u32) -> Result<Vec<u8>> {
        let file_key = self.file_key.as_ref().ok_or_else(|| {
            Error::Encryption("no password has been accepted for this document".to_string())
        })?;

        let key = algorithms::object_key(
            file_key,
            self.dict.revision,
            self.algorithm.is_aes(),
            obj_num,
            gen_num,
        );

        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => Ok(rc4::rc4_crypt(&key, data)),
            Algorithm::Aes128 | Algorithm::Aes256 => {
                if data.len() < aes::BLOCK_SIZE {
                    return Err(Error::Encryption(format!(
                        "AES payload of {} bytes is too short to hold an IV",
                        data.len()
                    )));
                }
                let (iv, ciphertext) = data.split_at(aes::BLOCK_SIZE);
                match self.algorithm {
                    Algorithm::Aes128 => aes::aes128_decrypt(&key, iv, ciphertext),
                    _ => aes::aes256_decrypt(&key, iv, ciphertext),
                }
            },
        }
    }

    /// Decrypt a string. Same construction as streams.
    pub fn decrypt_string(&self, data: &[u8], obj_num: u32, gen_num: u32) -> Result<Vec<u8>> {
        self.decrypt_stream(data, obj_num, gen_num)
    }
}

// ============================================================================
// Tests
// ============================================================================
