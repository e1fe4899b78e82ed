//! RC4 stream cipher.
//!
//! The cipher behind revisions 2 and 3 of the standard security handler.
//! Weak by modern standards but still everywhere in older files.
//! Encryption and decryption are the same keystream XOR.

/// Key-scheduled RC4 state.
struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Run the key schedule. Keys are 5 to 16 bytes in PDF use.
    fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty());

        let mut state = [0u8; 256];
        for (i, slot) in state.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    fn keystream_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let sum = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[sum as usize]
    }
}

/// Apply RC4 with `key` to `data`. Symmetric, so this both encrypts and
/// decrypts.
pub fn rc4_crypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut cipher = Rc4::new(key);
    data.iter().map(|b| b ^ cipher.keystream_byte()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        // classic published RC4 test vectors
        assert_eq!(
            rc4_crypt(b"Key", b"Plaintext"),
            vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]
        );
        assert_eq!(
            rc4_crypt(b"Wiki", b"pedia"),
            vec![0x10, 0x21, 0xBF, 0x04, 0x20]
        );
        assert_eq!(
            rc4_crypt(b"Secret", b"Attack at dawn"),
            vec![
                0x45, 0xA0, 0x1F, 0x64, 0x5F, 0xC3, 0x5B, 0x38, 0x35, 0x52, 0x54, 0x4B, 0x9B,
                0xF5
            ]
        );
    }

    #[test]
    fn test_symmetric() {
        let key = b"seekrit";
        let plaintext = b"round and round it goes";

        let ciphertext = rc4_crypt(key, plaintext);
        assert_ne!(&ciphertext[..], &plaintext[..]);
        assert_eq!(rc4_crypt(key, &ciphertext), plaintext.to_vec());
    }

    #[test]
    fn test_empty_input() {
        assert!(rc4_crypt(b"key", b"").is_empty());
    }

    #[test]
    fn test_key_sensitivity() {
        let plaintext = b"same message";
        assert_ne!(rc4_crypt(b"key one", plaintext), rc4_crypt(b"key two", plaintext));
    }
}
