//! AES-256-GCM implementation of the [`Cipher`] trait.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{error::VaultError, kdf::IV_LEN, traits::Cipher};

/// GCM authentication tag length.
const TAG_LEN: usize = 16;

/// AES-256-GCM AEAD cipher.
///
/// Output layout: `[ciphertext: N bytes][GCM tag: 16 bytes]`; the 12-byte nonce
/// is stored separately as the envelope iv.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl Aes256GcmCipher {
    fn check_nonce(nonce: &[u8]) -> Result<(), VaultError> {
        if nonce.len() != IV_LEN {
            return Err(VaultError::corrupted(format!(
                "iv must be {IV_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        Ok(())
    }
}

impl Cipher for Aes256GcmCipher {
    fn nonce_len(&self) -> usize {
        IV_LEN
    }

    fn encrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        Self::check_nonce(nonce)?;
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::CipherError(e.to_string()))?;

        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| VaultError::CipherError(e.to_string()))
    }

    fn decrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        Self::check_nonce(nonce)?;
        if ciphertext.len() < TAG_LEN {
            return Err(VaultError::corrupted("ciphertext too short"));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::CipherError(e.to_string()))?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::InvalidPassword)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; IV_LEN] = [0x07; IV_LEN];

    #[test]
    fn round_trip() {
        let cipher = Aes256GcmCipher;
        let encrypted = cipher.encrypt(&KEY, &NONCE, b"hello vault").unwrap();
        assert_eq!(encrypted.len(), b"hello vault".len() + TAG_LEN);
        let decrypted = cipher.decrypt(&KEY, &NONCE, &encrypted).unwrap();
        assert_eq!(decrypted, b"hello vault");
    }

    #[test]
    fn wrong_key_is_invalid_password() {
        let cipher = Aes256GcmCipher;
        let encrypted = cipher.encrypt(&KEY, &NONCE, b"secret").unwrap();
        let result = cipher.decrypt(&[0x43; 32], &NONCE, &encrypted);
        assert!(matches!(result, Err(VaultError::InvalidPassword)));
    }

    #[test]
    fn wrong_nonce_is_invalid_password() {
        let cipher = Aes256GcmCipher;
        let encrypted = cipher.encrypt(&KEY, &NONCE, b"secret").unwrap();
        let result = cipher.decrypt(&KEY, &[0x08; IV_LEN], &encrypted);
        assert!(matches!(result, Err(VaultError::InvalidPassword)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = Aes256GcmCipher;
        let mut encrypted = cipher.encrypt(&KEY, &NONCE, b"secret").unwrap();
        encrypted[0] ^= 0x01;
        let result = cipher.decrypt(&KEY, &NONCE, &encrypted);
        assert!(matches!(result, Err(VaultError::InvalidPassword)));
    }

    #[test]
    fn short_nonce_is_corrupted() {
        let cipher = Aes256GcmCipher;
        let result = cipher.encrypt(&KEY, &[0u8; 8], b"secret");
        assert!(matches!(result, Err(VaultError::CorruptedData(_))));
    }

    #[test]
    fn too_short_ciphertext_is_corrupted() {
        let cipher = Aes256GcmCipher;
        let result = cipher.decrypt(&KEY, &NONCE, &[0u8; 10]);
        assert!(matches!(result, Err(VaultError::CorruptedData(_))));
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = Aes256GcmCipher;
        let encrypted = cipher.encrypt(&KEY, &NONCE, b"").unwrap();
        let decrypted = cipher.decrypt(&KEY, &NONCE, &encrypted).unwrap();
        assert!(decrypted.is_empty());
    }
}
