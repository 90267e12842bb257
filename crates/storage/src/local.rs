//! Local strategy: key-value store plus this crate's encryption envelope.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::Value,
    termvault_vault::EncryptionEnvelope,
    tokio::sync::OnceCell,
    zeroize::Zeroizing,
};

use crate::{
    backend::{BackendKind, StorageBackend},
    error::{Error, Result},
    kv::{KvOp, KvStore},
    migration,
    types::{
        CONNECTIONS_KEY, LEGACY_METADATA_KEY, METADATA_KEY, StorageData, StorageMetadata, now_ms,
    },
};

/// Stores the connections entry and its metadata in a [`KvStore`].
///
/// The connections entry and the metadata entry are always written together in
/// one transaction, so a reader never sees `isEncrypted` disagree with the
/// stored value.
pub struct LocalBackend {
    kv: KvStore,
    envelope: Arc<EncryptionEnvelope>,
    migrated: OnceCell<()>,
}

impl LocalBackend {
    pub fn new(kv: KvStore, envelope: Arc<EncryptionEnvelope>) -> Self {
        Self {
            kv,
            envelope,
            migrated: OnceCell::new(),
        }
    }

    /// Runs the legacy-key migration once per instance.
    async fn ensure_migrated(&self) -> Result<()> {
        self.migrated
            .get_or_try_init(|| async {
                migration::migrate_legacy_metadata(&self.kv).await?;
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn metadata(&self) -> Result<Option<StorageMetadata>> {
        self.kv
            .get_as::<StorageMetadata>(METADATA_KEY)
            .await
            .map_err(|e| match e {
                Error::Json(e) => Error::corrupted(format!("unreadable storage metadata: {e}")),
                other => other,
            })
    }

    /// Decode a stored value according to its metadata.
    async fn decode(&self, stored: Value, metadata: Option<StorageMetadata>) -> Result<StorageData> {
        match (metadata, stored) {
            (Some(meta), Value::String(ciphertext)) if meta.is_encrypted => {
                let sealed = meta.sealed(ciphertext)?;
                let plaintext = Zeroizing::new(self.envelope.open(sealed).await?);
                serde_json::from_slice(&plaintext)
                    .map_err(|e| Error::corrupted(format!("decrypted payload is not valid: {e}")))
            },
            (Some(meta), _) if meta.is_encrypted => Err(Error::corrupted(
                "metadata marks data encrypted but the stored value is not ciphertext",
            )),
            (_, Value::String(_)) => Err(Error::corrupted(
                "stored value looks like ciphertext but metadata is not encrypted",
            )),
            (_, value) => serde_json::from_value(value)
                .map_err(|e| Error::corrupted(format!("stored payload is not valid: {e}"))),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn set_password(&self, password: Option<&str>) -> Result<()> {
        match password {
            Some(password) => self.envelope.set_password(password).await,
            None => self.envelope.clear_password().await,
        }
        Ok(())
    }

    async fn is_unlocked(&self) -> bool {
        self.envelope.is_unlocked().await
    }

    async fn save(&self, data: &StorageData, use_password: bool) -> Result<()> {
        self.ensure_migrated().await?;
        let timestamp = now_ms();

        let (stored, metadata) = if use_password {
            let plaintext = serde_json::to_vec(data)?;
            let sealed = self.envelope.seal(plaintext).await?;
            let metadata = StorageMetadata::encrypted(&sealed, timestamp);
            (Value::String(sealed.ciphertext), metadata)
        } else {
            (serde_json::to_value(data)?, StorageMetadata::plaintext(timestamp))
        };

        // Payload first, metadata last, both inside one transaction.
        self.kv
            .write_batch(vec![
                KvOp::put(CONNECTIONS_KEY, stored),
                KvOp::put(METADATA_KEY, serde_json::to_value(&metadata)?),
            ])
            .await?;

        tracing::info!(
            encrypted = metadata.is_encrypted,
            connections = data.connections.len(),
            "saved connections"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<StorageData>> {
        self.ensure_migrated().await?;
        let Some(stored) = self.kv.get(CONNECTIONS_KEY).await? else {
            return Ok(None);
        };
        let metadata = self.metadata().await?;
        let data = self.decode(stored, metadata).await?;

        tracing::debug!(connections = data.connections.len(), "loaded connections");
        Ok(Some(data))
    }

    async fn has_stored_data(&self) -> Result<bool> {
        self.ensure_migrated().await?;
        self.kv.contains(CONNECTIONS_KEY).await
    }

    async fn is_encrypted(&self) -> Result<bool> {
        self.ensure_migrated().await?;
        Ok(self.metadata().await?.is_some_and(|m| m.is_encrypted))
    }

    async fn verify_password(&self, password: &str) -> Result<()> {
        self.ensure_migrated().await?;
        let Some(meta) = self.metadata().await?.filter(|m| m.is_encrypted) else {
            return Ok(());
        };
        let Some(Value::String(ciphertext)) = self.kv.get(CONNECTIONS_KEY).await? else {
            return Err(Error::corrupted(
                "metadata marks data encrypted but no ciphertext is stored",
            ));
        };
        let sealed = meta.sealed(ciphertext)?;
        let envelope = Arc::clone(&self.envelope);
        let password = Zeroizing::new(password.to_owned());

        tokio::task::spawn_blocking(move || {
            envelope
                .decrypt(&sealed, &password)
                .map(|plaintext| drop(Zeroizing::new(plaintext)))
        })
        .await??;
        Ok(())
    }

    async fn change_password(&self, new_password: &str) -> Result<()> {
        if let Some(mut data) = self.load().await? {
            data.timestamp = now_ms();
            let plaintext = serde_json::to_vec(&data)?;
            let sealed = self
                .envelope
                .seal_with_password(plaintext, new_password)
                .await?;
            let metadata = StorageMetadata::encrypted(&sealed, data.timestamp);

            self.kv
                .write_batch(vec![
                    KvOp::put(CONNECTIONS_KEY, Value::String(sealed.ciphertext)),
                    KvOp::put(METADATA_KEY, serde_json::to_value(&metadata)?),
                ])
                .await?;
        }

        // Only hold the new password once the re-encrypted payload is stored.
        self.envelope.set_password(new_password).await;
        tracing::info!("re-encrypted stored connections under new password");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        // Migration must not resurrect a legacy key after the delete.
        self.ensure_migrated().await?;
        self.kv
            .write_batch(vec![
                KvOp::delete(CONNECTIONS_KEY),
                KvOp::delete(METADATA_KEY),
                KvOp::delete(LEGACY_METADATA_KEY),
            ])
            .await?;
        tracing::info!("cleared stored connections");
        Ok(())
    }
}
