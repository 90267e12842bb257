//! The persistence contract shared by the delegated and local strategies.

use std::sync::Arc;

use {async_trait::async_trait, termvault_vault::EncryptionEnvelope};

use crate::{
    delegated::{DelegatedBackend, HostStore},
    error::Result,
    kv::KvStore,
    local::LocalBackend,
    types::StorageData,
};

/// Which strategy is serving storage calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host-managed store; encryption happens on the host side.
    Delegated,
    /// Local key-value store; this crate encrypts.
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delegated => write!(f, "delegated"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Save/load contract for the connection payload.
///
/// Implementations are chosen once at startup by [`detect_backend`]; callers
/// depend only on this trait.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Hold `Some(password)` for subsequent saves/loads, or drop it with `None`.
    async fn set_password(&self, password: Option<&str>) -> Result<()>;

    /// Whether a password is currently held.
    async fn is_unlocked(&self) -> bool;

    /// Persist `data`, encrypted with the held password when `use_password`.
    async fn save(&self, data: &StorageData, use_password: bool) -> Result<()>;

    /// Load the stored payload, decrypting if needed. `None` if nothing is stored.
    async fn load(&self) -> Result<Option<StorageData>>;

    async fn has_stored_data(&self) -> Result<bool>;

    async fn is_encrypted(&self) -> Result<bool>;

    /// Check `password` against the stored payload without changing lock state.
    ///
    /// Succeeds when nothing encrypted is stored.
    async fn verify_password(&self, password: &str) -> Result<()>;

    /// Re-encrypt any stored payload under `new_password`, then hold it.
    ///
    /// The new password only replaces the held one once the re-encrypted
    /// payload is durably written; on error the previous password stays in
    /// effect and the stored payload is unchanged.
    async fn change_password(&self, new_password: &str) -> Result<()>;

    /// Remove the stored payload and its metadata.
    async fn clear(&self) -> Result<()>;
}

/// Pick the backend: the host store when one is offered and reports itself
/// available, otherwise the local store.
pub async fn detect_backend(
    host: Option<Arc<dyn HostStore>>,
    kv: KvStore,
    envelope: Arc<EncryptionEnvelope>,
) -> Arc<dyn StorageBackend> {
    if let Some(host) = host {
        if host.is_available().await {
            tracing::info!(backend = %BackendKind::Delegated, "storage backend selected");
            return Arc::new(DelegatedBackend::new(host));
        }
        tracing::warn!("host store unavailable, falling back to local storage");
    }
    tracing::info!(backend = %BackendKind::Local, "storage backend selected");
    Arc::new(LocalBackend::new(kv, envelope))
}
