//! Delegated strategy: a host-managed store that encrypts on its own side.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::RwLock, zeroize::Zeroizing};

use crate::{
    backend::{BackendKind, StorageBackend},
    error::Result,
    types::{StorageData, now_ms},
};

/// The surface a host application exposes when it manages encrypted storage
/// itself (an OS keychain or a native shell's secure store).
///
/// Implementations report failures as [`Error::Host`](crate::Error::Host) or,
/// for authentication problems, as the matching vault error so callers see
/// the same [`ErrorKind`](crate::ErrorKind) as with the local store.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Whether the host store can be used right now. Checked once at startup.
    async fn is_available(&self) -> bool {
        true
    }

    async fn set_storage_password(&self, password: Option<&str>) -> Result<()>;

    async fn save_data(&self, data: &StorageData, use_password: bool) -> Result<()>;

    async fn load_data(&self) -> Result<Option<StorageData>>;

    async fn has_stored_data(&self) -> Result<bool>;

    async fn is_storage_encrypted(&self) -> Result<bool>;

    async fn clear_storage(&self) -> Result<()>;

    /// Check a password without changing lock state. Hosts that cannot do this
    /// accept every password and defer the failure to the next load.
    async fn verify_password(&self, _password: &str) -> Result<()> {
        Ok(())
    }
}

/// Forwards every call to a [`HostStore`]; the local envelope is never used.
///
/// The password handed to the host is remembered so a failed password change
/// can hand the previous one back.
pub struct DelegatedBackend {
    host: Arc<dyn HostStore>,
    password: RwLock<Option<Zeroizing<String>>>,
}

impl DelegatedBackend {
    pub fn new(host: Arc<dyn HostStore>) -> Self {
        Self {
            host,
            password: RwLock::new(None),
        }
    }

    async fn reencrypt(&self, data: Option<StorageData>, new_password: &str) -> Result<()> {
        self.host.set_storage_password(Some(new_password)).await?;
        if let Some(mut data) = data {
            data.timestamp = now_ms();
            self.host.save_data(&data, true).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DelegatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Delegated
    }

    async fn set_password(&self, password: Option<&str>) -> Result<()> {
        self.host.set_storage_password(password).await?;
        *self.password.write().await = password.map(|p| Zeroizing::new(p.to_owned()));
        Ok(())
    }

    async fn is_unlocked(&self) -> bool {
        self.password.read().await.is_some()
    }

    async fn save(&self, data: &StorageData, use_password: bool) -> Result<()> {
        self.host.save_data(data, use_password).await?;
        tracing::info!(
            encrypted = use_password,
            connections = data.connections.len(),
            "saved connections to host store"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<StorageData>> {
        self.host.load_data().await
    }

    async fn has_stored_data(&self) -> Result<bool> {
        self.host.has_stored_data().await
    }

    async fn is_encrypted(&self) -> Result<bool> {
        self.host.is_storage_encrypted().await
    }

    async fn verify_password(&self, password: &str) -> Result<()> {
        self.host.verify_password(password).await
    }

    async fn change_password(&self, new_password: &str) -> Result<()> {
        let data = self.host.load_data().await?;
        let previous = self.password.read().await.clone();

        if let Err(e) = self.reencrypt(data, new_password).await {
            if let Err(restore) = self
                .host
                .set_storage_password(previous.as_ref().map(|p| p.as_str()))
                .await
            {
                tracing::warn!(error = %restore, "could not restore previous host password");
            }
            return Err(e);
        }

        *self.password.write().await = Some(Zeroizing::new(new_password.to_owned()));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.host.clear_storage().await?;
        tracing::info!("cleared host store");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{Error, ErrorKind, types::Connection},
        std::sync::atomic::{AtomicBool, Ordering},
        tokio::sync::Mutex,
    };

    #[derive(Default)]
    struct RecordingHost {
        password: Mutex<Option<String>>,
        stored: Mutex<Option<(StorageData, bool)>>,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl HostStore for RecordingHost {
        async fn set_storage_password(&self, password: Option<&str>) -> Result<()> {
            *self.password.lock().await = password.map(str::to_owned);
            Ok(())
        }

        async fn save_data(&self, data: &StorageData, use_password: bool) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(Error::host("keychain write rejected"));
            }
            *self.stored.lock().await = Some((data.clone(), use_password));
            Ok(())
        }

        async fn load_data(&self) -> Result<Option<StorageData>> {
            Ok(self.stored.lock().await.as_ref().map(|(d, _)| d.clone()))
        }

        async fn has_stored_data(&self) -> Result<bool> {
            Ok(self.stored.lock().await.is_some())
        }

        async fn is_storage_encrypted(&self) -> Result<bool> {
            Ok(self.stored.lock().await.as_ref().is_some_and(|(_, e)| *e))
        }

        async fn clear_storage(&self) -> Result<()> {
            *self.stored.lock().await = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_to_host() {
        let host = Arc::new(RecordingHost::default());
        let backend = DelegatedBackend::new(host.clone());
        assert_eq!(backend.kind(), BackendKind::Delegated);

        backend.set_password(Some("pw")).await.unwrap();
        assert!(backend.is_unlocked().await);
        assert_eq!(host.password.lock().await.as_deref(), Some("pw"));

        let data = StorageData::new(vec![Connection::new("a")]);
        backend.save(&data, true).await.unwrap();
        assert!(backend.has_stored_data().await.unwrap());
        assert!(backend.is_encrypted().await.unwrap());
        assert_eq!(backend.load().await.unwrap(), Some(data));

        backend.clear().await.unwrap();
        assert!(!backend.has_stored_data().await.unwrap());
    }

    #[tokio::test]
    async fn clearing_password_locks() {
        let host = Arc::new(RecordingHost::default());
        let backend = DelegatedBackend::new(host.clone());
        backend.set_password(Some("pw")).await.unwrap();
        backend.set_password(None).await.unwrap();

        assert!(!backend.is_unlocked().await);
        assert!(host.password.lock().await.is_none());
    }

    #[tokio::test]
    async fn change_password_resaves_under_new_password() {
        let host = Arc::new(RecordingHost::default());
        let backend = DelegatedBackend::new(host.clone());
        backend.set_password(Some("old")).await.unwrap();
        let data = StorageData::new(vec![Connection::new("a")]);
        backend.save(&data, true).await.unwrap();

        backend.change_password("new").await.unwrap();
        assert_eq!(host.password.lock().await.as_deref(), Some("new"));
        let (stored, encrypted) = host.stored.lock().await.clone().unwrap();
        assert!(encrypted);
        assert_eq!(stored.connections, data.connections);
        assert!(backend.is_unlocked().await);
    }

    #[tokio::test]
    async fn failed_change_password_restores_host_password() {
        let host = Arc::new(RecordingHost::default());
        let backend = DelegatedBackend::new(host.clone());
        backend.set_password(Some("old")).await.unwrap();
        let data = StorageData::new(vec![Connection::new("a")]);
        backend.save(&data, true).await.unwrap();

        host.fail_saves.store(true, Ordering::SeqCst);
        let err = backend.change_password("new").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageIo);

        assert_eq!(host.password.lock().await.as_deref(), Some("old"));
        assert_eq!(
            backend.password.read().await.as_ref().map(|p| p.as_str()),
            Some("old")
        );
        assert_eq!(backend.load().await.unwrap(), Some(data));
    }
}
