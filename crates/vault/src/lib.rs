//! Password-based encryption at rest using AES-256-GCM.
//!
//! A key is derived from the session password with PBKDF2-HMAC-SHA256 and a
//! fresh random salt on every encryption; the salt, iv and iteration count are
//! returned alongside the ciphertext as a [`SealedEnvelope`]. The iteration
//! count can be calibrated to the host with [`benchmark`]. Trait-based
//! [`Cipher`] design allows swapping the AEAD.

pub mod aes256gcm;
pub mod benchmark;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod traits;

pub use {
    aes256gcm::Aes256GcmCipher,
    benchmark::{BenchmarkOutcome, BenchmarkParams},
    envelope::{EncryptionEnvelope, SealedEnvelope},
    error::VaultError,
    kdf::KdfParams,
    traits::Cipher,
};
