//! Vault error types.

/// Errors produced by key derivation and envelope operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A decrypt or encrypt was attempted while no password is held.
    #[error("password required: storage is locked")]
    PasswordRequired,

    /// The authentication tag did not verify (wrong password or tampered data).
    #[error("invalid password or tampered data")]
    InvalidPassword,

    /// The envelope is malformed or its metadata is inconsistent.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The host lacks a primitive needed for key derivation or timing.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// The cipher rejected its inputs for a reason other than authentication.
    #[error("cipher error: {0}")]
    CipherError(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedData(message.into())
    }
}
