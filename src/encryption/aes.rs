//! AES-CBC primitives for revisions 4 through 6.
//!
//! Stream and string content uses CBC with PKCS#7 padding and a random
//! 16-byte IV stored ahead of the ciphertext. The AES-256 key wrapping
//! entries (/UE, /OE, /Perms) and the hardened password hash use CBC with
//! no padding and a zero IV, so unpadded variants are provided as well.

use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use cbc::{Decryptor, Encryptor};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

fn check_key(key: &[u8], expected: usize) -> Result<()> {
    if key.len() != expected {
        return Err(Error::Encryption(format!(
            "AES key must be {} bytes, got {}",
            expected,
            key.len()
        )));
    }
    Ok(())
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != BLOCK_SIZE {
        return Err(Error::Encryption(format!(
            "AES IV must be {} bytes, got {}",
            BLOCK_SIZE,
            iv.len()
        )));
    }
    Ok(())
}

fn check_block_aligned(data: &[u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Encryption(format!(
            "ciphertext length {} is not a multiple of {}",
            data.len(),
            BLOCK_SIZE
        )));
    }
    Ok(())
}

fn apply_pkcs7(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut padded = data.to_vec();
    padded.resize(data.len() + pad, pad as u8);
    padded
}

fn strip_pkcs7(data: &[u8]) -> Result<Vec<u8>> {
    let Some(&last) = data.last() else {
        return Ok(Vec::new());
    };
    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(Error::Encryption("invalid PKCS#7 padding".to_string()));
    }
    let content_len = data.len() - pad;
    if data[content_len..].iter().any(|&b| b != last) {
        return Err(Error::Encryption("invalid PKCS#7 padding".to_string()));
    }
    Ok(data[..content_len].to_vec())
}

/// AES-128-CBC encrypt with PKCS#7 padding.
pub fn aes128_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 16)?;
    check_iv(iv)?;

    let mut padded = apply_pkcs7(data);
    let len = padded.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Encryption("AES-128 encryption failed".to_string()))?;
    Ok(padded)
}

/// AES-128-CBC decrypt and strip PKCS#7 padding.
pub fn aes128_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 16)?;
    check_iv(iv)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    check_block_aligned(data)?;

    let mut buffer = data.to_vec();
    let decrypted = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Encryption("AES-128 decryption failed".to_string()))?;
    strip_pkcs7(decrypted)
}

/// AES-256-CBC encrypt with PKCS#7 padding.
pub fn aes256_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 32)?;
    check_iv(iv)?;

    let mut padded = apply_pkcs7(data);
    let len = padded.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Encryption("AES-256 encryption failed".to_string()))?;
    Ok(padded)
}

/// AES-256-CBC decrypt and strip PKCS#7 padding.
pub fn aes256_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 32)?;
    check_iv(iv)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    check_block_aligned(data)?;

    let mut buffer = data.to_vec();
    let decrypted = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Encryption("AES-256 decryption failed".to_string()))?;
    strip_pkcs7(decrypted)
}

/// AES-128-CBC encrypt without padding. Input must be block aligned.
pub fn aes128_encrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 16)?;
    check_iv(iv)?;
    check_block_aligned(data)?;

    let mut buffer = data.to_vec();
    let len = buffer.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| Error::Encryption("AES-128 encryption failed".to_string()))?;
    Ok(buffer)
}

/// AES-256-CBC encrypt without padding. Input must be block aligned.
pub fn aes256_encrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 32)?;
    check_iv(iv)?;
    check_block_aligned(data)?;

    let mut buffer = data.to_vec();
    let len = buffer.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| Error::Encryption("AES-256 encryption failed".to_string()))?;
    Ok(buffer)
}

/// AES-256-CBC decrypt without padding. Input must be block aligned.
pub fn aes256_decrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key, 32)?;
    check_iv(iv)?;
    check_block_aligned(data)?;

    let mut buffer = data.to_vec();
    let decrypted = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Encryption("AES-256 decryption failed".to_string()))?;
    Ok(decrypted.to_vec())
}

// ============================================================================
// Tests
// ============================================================================
