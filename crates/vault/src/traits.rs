//! Cipher trait for swappable authenticated encryption backends.

use crate::error::VaultError;

/// Trait for authenticated encryption keyed by a 256-bit key and an explicit nonce.
///
/// The nonce is supplied by the caller because the envelope records it next to
/// the ciphertext instead of inside it.
pub trait Cipher: Send + Sync {
    /// Nonce length this cipher expects.
    fn nonce_len(&self) -> usize;

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    fn encrypt(&self, key: &[u8; 32], nonce: &[u8], plaintext: &[u8])
    -> Result<Vec<u8>, VaultError>;

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// A tag mismatch must surface as [`VaultError::InvalidPassword`].
    fn decrypt(&self, key: &[u8; 32], nonce: &[u8], ciphertext: &[u8])
    -> Result<Vec<u8>, VaultError>;
}
