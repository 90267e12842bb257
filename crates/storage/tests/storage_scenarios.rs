#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end scenarios over a full `StorageService`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    termvault_config::TermvaultConfig,
    termvault_storage::{
        BackendKind, Error, ErrorKind, HostStore, KvStore, Result, StorageData, StorageService,
        run_migrations,
    },
    tokio::sync::Mutex,
};

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn config() -> TermvaultConfig {
    let mut config = TermvaultConfig::default();
    config.kdf.iterations = Some(1_000);
    config.logs.action_log_max = 5;
    config
}

async fn local_service() -> (StorageService, KvStore) {
    let pool = memory_pool().await;
    let kv = KvStore::new(pool.clone());
    let svc = StorageService::with_pool(pool, &config(), None)
        .await
        .unwrap();
    (svc, kv)
}

fn scenario_data() -> StorageData {
    serde_json::from_value(json!({"connections": [{"id": "a"}]})).unwrap()
}

#[tokio::test]
async fn pw1_save_pw2_load_is_invalid_password() {
    let (svc, _) = local_service().await;
    svc.unlock("pw1").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();

    svc.lock().await.unwrap();
    svc.unlock("pw2").await.unwrap();
    let err = svc.load().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPassword);

    svc.unlock("pw1").await.unwrap();
    let loaded = svc.load().await.unwrap().unwrap();
    assert_eq!(loaded.connections, scenario_data().connections);
}

#[tokio::test]
async fn has_stored_data_turns_true_after_plain_save() {
    let (svc, _) = local_service().await;
    assert!(!svc.has_stored_data().await.unwrap());

    svc.save(&scenario_data(), false).await.unwrap();
    assert!(svc.has_stored_data().await.unwrap());
    assert!(!svc.is_encrypted().await.unwrap());
}

#[tokio::test]
async fn disabling_encryption_allows_password_free_load() {
    let (svc, kv) = local_service().await;
    svc.unlock("pw").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();
    assert!(svc.is_encrypted().await.unwrap());

    svc.save(&scenario_data(), false).await.unwrap();
    svc.lock().await.unwrap();

    assert!(!svc.is_encrypted().await.unwrap());
    let meta = kv.get("storage_metadata").await.unwrap().unwrap();
    assert!(meta.get("salt").is_none() && meta.get("iv").is_none());

    let loaded = svc.load().await.unwrap().unwrap();
    assert_eq!(loaded.connections, scenario_data().connections);
}

#[tokio::test]
async fn stored_ciphertext_hides_plaintext() {
    let (svc, kv) = local_service().await;
    let mut data = scenario_data();
    data.connections[0].password = Some("s3cret-value".into());

    svc.unlock("pw").await.unwrap();
    svc.save(&data, true).await.unwrap();

    let raw = kv.get("connections").await.unwrap().unwrap();
    assert!(matches!(raw, Value::String(_)));
    assert!(!raw.to_string().contains("s3cret-value"));
}

#[tokio::test]
async fn tampered_ciphertext_is_rejected() {
    let (svc, kv) = local_service().await;
    svc.unlock("pw").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();

    let Value::String(ct) = kv.get("connections").await.unwrap().unwrap() else {
        panic!("expected ciphertext string");
    };
    let mut bytes = ct.into_bytes();
    // Swap one base64 character for another valid one.
    bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
    kv.set("connections", &Value::String(String::from_utf8(bytes).unwrap()))
        .await
        .unwrap();

    let err = svc.load().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPassword);
}

#[tokio::test]
async fn legacy_metadata_key_migrated_once() {
    let pool = memory_pool().await;
    let kv = KvStore::new(pool.clone());
    kv.set(
        "connections",
        &json!({"connections": [{"id": "a"}], "settings": {}, "timestamp": 1}),
    )
    .await
    .unwrap();
    kv.set(
        "connections_meta",
        &json!({"isEncrypted": false, "hasPassword": false, "timestamp": 1}),
    )
    .await
    .unwrap();

    let svc = StorageService::with_pool(pool, &config(), None)
        .await
        .unwrap();
    assert!(!svc.is_encrypted().await.unwrap());
    assert!(!kv.contains("connections_meta").await.unwrap());
    let migrated = kv.get("storage_metadata").await.unwrap();

    svc.load().await.unwrap().unwrap();
    assert_eq!(kv.get("storage_metadata").await.unwrap(), migrated);
}

#[tokio::test]
async fn action_log_holds_exactly_max_newest_entries() {
    let (svc, _) = local_service().await;
    for i in 0..8 {
        svc.settings()
            .log_action(format!("connect-{i}"), json!({"host": i}))
            .await
            .unwrap();
    }

    let log = svc.settings().action_log().await.unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0].action, "connect-7");
    assert_eq!(log[4].action, "connect-3");
}

#[tokio::test]
async fn settings_stay_plaintext_while_connections_encrypted() {
    let (svc, kv) = local_service().await;
    svc.unlock("pw").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();
    svc.settings()
        .update_setting("theme", json!("dark"))
        .await
        .unwrap();

    assert_eq!(
        kv.get("settings").await.unwrap(),
        Some(json!({"theme": "dark"}))
    );
}

#[tokio::test]
async fn clear_then_load_is_empty() {
    let (svc, _) = local_service().await;
    svc.unlock("pw").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();

    svc.clear().await.unwrap();
    assert!(svc.load().await.unwrap().is_none());
    assert!(!svc.is_encrypted().await.unwrap());
}

// ── Delegated backend ───────────────────────────────────────────────────────

#[derive(Default)]
struct FakeHost {
    available: bool,
    password: Mutex<Option<String>>,
    stored: Mutex<Option<(StorageData, bool, Option<String>)>>,
    reject_saves: AtomicBool,
}

#[async_trait]
impl HostStore for FakeHost {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn set_storage_password(&self, password: Option<&str>) -> Result<()> {
        *self.password.lock().await = password.map(str::to_owned);
        Ok(())
    }

    async fn save_data(&self, data: &StorageData, use_password: bool) -> Result<()> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(Error::host("secure store is full"));
        }
        let password = self.password.lock().await.clone();
        *self.stored.lock().await = Some((data.clone(), use_password, password));
        Ok(())
    }

    async fn load_data(&self) -> Result<Option<StorageData>> {
        let current = self.password.lock().await.clone();
        match self.stored.lock().await.as_ref() {
            None => Ok(None),
            Some((data, false, _)) => Ok(Some(data.clone())),
            Some((_, true, _)) if current.is_none() => {
                Err(termvault_vault::VaultError::PasswordRequired.into())
            },
            Some((data, true, saved_with)) if *saved_with == current => Ok(Some(data.clone())),
            Some(_) => Err(termvault_vault::VaultError::InvalidPassword.into()),
        }
    }

    async fn has_stored_data(&self) -> Result<bool> {
        Ok(self.stored.lock().await.is_some())
    }

    async fn is_storage_encrypted(&self) -> Result<bool> {
        Ok(self
            .stored
            .lock()
            .await
            .as_ref()
            .is_some_and(|(_, encrypted, _)| *encrypted))
    }

    async fn clear_storage(&self) -> Result<()> {
        *self.stored.lock().await = None;
        Ok(())
    }
}

#[tokio::test]
async fn available_host_is_used_and_local_store_untouched() {
    let pool = memory_pool().await;
    let kv = KvStore::new(pool.clone());
    let host = Arc::new(FakeHost {
        available: true,
        ..FakeHost::default()
    });
    let delegated: Arc<dyn HostStore> = host.clone();
    let svc = StorageService::with_pool(pool, &config(), Some(delegated))
        .await
        .unwrap();
    assert_eq!(svc.backend_kind(), BackendKind::Delegated);

    svc.unlock("pw1").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();
    assert!(svc.is_encrypted().await.unwrap());
    assert!(!kv.contains("connections").await.unwrap());
    assert!(!kv.contains("storage_metadata").await.unwrap());

    svc.unlock("pw2").await.unwrap();
    assert_eq!(
        svc.load().await.unwrap_err().kind(),
        ErrorKind::InvalidPassword
    );
}

#[tokio::test]
async fn unavailable_host_falls_back_to_local() {
    let pool = memory_pool().await;
    let host: Arc<dyn HostStore> = Arc::new(FakeHost::default());
    let svc = StorageService::with_pool(pool, &config(), Some(host))
        .await
        .unwrap();
    assert_eq!(svc.backend_kind(), BackendKind::Local);
}

#[tokio::test]
async fn failed_password_change_keeps_session_on_old_password() {
    let pool = memory_pool().await;
    let host = Arc::new(FakeHost {
        available: true,
        ..FakeHost::default()
    });
    let delegated: Arc<dyn HostStore> = host.clone();
    let svc = StorageService::with_pool(pool, &config(), Some(delegated))
        .await
        .unwrap();

    svc.unlock("old").await.unwrap();
    svc.save(&scenario_data(), true).await.unwrap();

    host.reject_saves.store(true, Ordering::SeqCst);
    let err = svc.change_password("new").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageIo);
    host.reject_saves.store(false, Ordering::SeqCst);

    // The host still decrypts with the old password.
    assert!(svc.is_unlocked().await);
    let loaded = svc.load().await.unwrap().unwrap();
    assert_eq!(loaded.connections, scenario_data().connections);

    svc.change_password("new").await.unwrap();
    svc.lock().await.unwrap();
    svc.unlock("new").await.unwrap();
    assert!(svc.load().await.unwrap().is_some());
}
