//! PBKDF2-HMAC-SHA256 key derivation for password → AES key.

use {base64::Engine, rand::RngCore, sha2::Sha256, zeroize::Zeroizing};

use crate::error::VaultError;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce (iv) length in bytes.
pub const IV_LEN: usize = 12;

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Iteration count used when nothing else has been configured or calibrated.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2 parameters recorded next to every ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// The same password, salt and iteration count always yield the same key.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
    if salt.len() != SALT_LEN {
        return Err(VaultError::corrupted(format!(
            "salt must be {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }
    if params.iterations == 0 {
        return Err(VaultError::CipherError(
            "iteration count must be positive".to_string(),
        ));
    }

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, output.as_mut());
    Ok(output)
}

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Generate a fresh random iv of `len` bytes.
pub fn generate_iv(len: usize) -> Vec<u8> {
    let mut iv = vec![0u8; len];
    rand::rng().fill_bytes(&mut iv);
    iv
}

pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 envelope field; bad input is corrupted data.
pub fn decode(b64: &str, what: &str) -> Result<Vec<u8>, VaultError> {
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| VaultError::corrupted(format!("{what} is not valid base64: {e}")))
}

/// Decode a base64 field and check it has exactly `len` bytes.
pub fn decode_exact(b64: &str, len: usize, what: &str) -> Result<Vec<u8>, VaultError> {
    let bytes = decode(b64, what)?;
    if bytes.len() != len {
        return Err(VaultError::corrupted(format!(
            "{what} must be {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
