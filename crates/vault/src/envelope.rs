//! Password-keyed AES-256-GCM envelope: lock state, encrypt, decrypt.

use std::sync::atomic::{AtomicU32, Ordering};

use {tokio::sync::RwLock, zeroize::Zeroizing};

use crate::{
    aes256gcm::Aes256GcmCipher,
    error::VaultError,
    kdf::{self, KEY_LEN, KdfParams, SALT_LEN},
    traits::Cipher,
};

/// Everything needed to decrypt a payload later, all binary fields base64.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SealedEnvelope {
    pub ciphertext: String,
    pub salt: String,
    pub iv: String,
    /// PBKDF2 iteration count the key was derived with.
    pub iterations: u32,
}

/// Holds the session password and applies PBKDF2 + AEAD to payloads.
///
/// Generic over [`Cipher`] but defaults to [`Aes256GcmCipher`]. The password is
/// held behind a `RwLock`; `None` means locked. Clearing drops the
/// `Zeroizing` buffer, which zeroes it, but copies made by the allocator or
/// the caller are out of reach, so scrubbing is best effort.
pub struct EncryptionEnvelope<C: Cipher = Aes256GcmCipher> {
    cipher: C,
    iterations: AtomicU32,
    password: RwLock<Option<Zeroizing<String>>>,
}

impl<C: Cipher> std::fmt::Debug for EncryptionEnvelope<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEnvelope")
            .field("iterations", &self.iterations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for EncryptionEnvelope<Aes256GcmCipher> {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionEnvelope<Aes256GcmCipher> {
    /// Create an envelope with the default AES-256-GCM cipher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cipher(Aes256GcmCipher)
    }
}

impl<C: Cipher + Clone + 'static> EncryptionEnvelope<C> {
    /// Create an envelope with a custom cipher.
    pub fn with_cipher(cipher: C) -> Self {
        Self {
            cipher,
            iterations: AtomicU32::new(kdf::DEFAULT_ITERATIONS),
            password: RwLock::new(None),
        }
    }

    /// Iteration count used for the next encryption.
    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Set the iteration count used for subsequent encryptions.
    ///
    /// Existing envelopes keep the count they were sealed with.
    pub fn set_iterations(&self, iterations: u32) {
        self.iterations.store(iterations.max(1), Ordering::Relaxed);
    }

    /// Hold `password` in memory and mark the envelope unlocked.
    ///
    /// No strength validation is done here.
    pub async fn set_password(&self, password: &str) {
        *self.password.write().await = Some(Zeroizing::new(password.to_owned()));

        #[cfg(feature = "tracing")]
        tracing::info!("storage password set");
    }

    /// Drop the held password and mark the envelope locked.
    pub async fn clear_password(&self) {
        *self.password.write().await = None;

        #[cfg(feature = "tracing")]
        tracing::info!("storage password cleared");
    }

    /// Whether a password is currently held.
    pub async fn is_unlocked(&self) -> bool {
        self.password.read().await.is_some()
    }

    /// Derive the AES key for `password` and `salt` with the configured iterations.
    pub fn derive_key(
        &self,
        password: &str,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        kdf::derive_key(
            password.as_bytes(),
            salt,
            &KdfParams::with_iterations(self.iterations()),
        )
    }

    /// Encrypt `plaintext` under `password` with a fresh salt and iv.
    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<SealedEnvelope, VaultError> {
        seal_with(&self.cipher, self.iterations(), plaintext, password)
    }

    /// Decrypt `sealed` with `password`.
    ///
    /// Tag failure yields [`VaultError::InvalidPassword`]; malformed fields yield
    /// [`VaultError::CorruptedData`].
    pub fn decrypt(&self, sealed: &SealedEnvelope, password: &str) -> Result<Vec<u8>, VaultError> {
        open_with(&self.cipher, sealed, password)
    }

    /// Encrypt with the held password, on the blocking pool.
    pub async fn seal(&self, plaintext: Vec<u8>) -> Result<SealedEnvelope, VaultError> {
        let password = self.held_password().await?;
        self.seal_blocking(plaintext, password).await
    }

    /// Encrypt under `password` without touching the held one, on the blocking pool.
    ///
    /// Used to re-encrypt under a new password before it is committed.
    pub async fn seal_with_password(
        &self,
        plaintext: Vec<u8>,
        password: &str,
    ) -> Result<SealedEnvelope, VaultError> {
        self.seal_blocking(plaintext, Zeroizing::new(password.to_owned()))
            .await
    }

    async fn seal_blocking(
        &self,
        plaintext: Vec<u8>,
        password: Zeroizing<String>,
    ) -> Result<SealedEnvelope, VaultError> {
        let cipher = self.cipher.clone();
        let iterations = self.iterations();
        let plaintext = Zeroizing::new(plaintext);

        tokio::task::spawn_blocking(move || seal_with(&cipher, iterations, &plaintext, &password))
            .await
            .map_err(|e| VaultError::CipherError(format!("encrypt task failed: {e}")))?
    }

    /// Decrypt with the held password, on the blocking pool.
    pub async fn open(&self, sealed: SealedEnvelope) -> Result<Vec<u8>, VaultError> {
        let password = self.held_password().await?;
        let cipher = self.cipher.clone();

        tokio::task::spawn_blocking(move || open_with(&cipher, &sealed, &password))
            .await
            .map_err(|e| VaultError::CipherError(format!("decrypt task failed: {e}")))?
    }

    async fn held_password(&self) -> Result<Zeroizing<String>, VaultError> {
        self.password
            .read()
            .await
            .clone()
            .ok_or(VaultError::PasswordRequired)
    }
}

fn seal_with<C: Cipher>(
    cipher: &C,
    iterations: u32,
    plaintext: &[u8],
    password: &str,
) -> Result<SealedEnvelope, VaultError> {
    // Salt and iv are never reused: both come fresh from the RNG on every call.
    let salt = kdf::generate_salt();
    let iv = kdf::generate_iv(cipher.nonce_len());
    let params = KdfParams::with_iterations(iterations);
    let key = kdf::derive_key(password.as_bytes(), &salt, &params)?;

    let ciphertext = cipher.encrypt(&key, &iv, plaintext)?;

    Ok(SealedEnvelope {
        ciphertext: kdf::encode(&ciphertext),
        salt: kdf::encode(&salt),
        iv: kdf::encode(&iv),
        iterations: params.iterations,
    })
}

fn open_with<C: Cipher>(
    cipher: &C,
    sealed: &SealedEnvelope,
    password: &str,
) -> Result<Vec<u8>, VaultError> {
    let salt = kdf::decode_exact(&sealed.salt, SALT_LEN, "salt")?;
    let iv = kdf::decode_exact(&sealed.iv, cipher.nonce_len(), "iv")?;
    let ciphertext = kdf::decode(&sealed.ciphertext, "ciphertext")?;
    if sealed.iterations == 0 {
        return Err(VaultError::corrupted("iteration count is zero"));
    }

    let key = kdf::derive_key(
        password.as_bytes(),
        &salt,
        &KdfParams::with_iterations(sealed.iterations),
    )?;
    cipher.decrypt(&key, &iv, &ciphertext)
}
