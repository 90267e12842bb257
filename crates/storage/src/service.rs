//! The storage context handed to the rest of the application.
//!
//! [`StorageService`] owns the selected [`StorageBackend`], the encryption
//! envelope and the [`SettingsStore`]. It is built once at startup and passed
//! around explicitly; tests build their own over an in-memory database.

use std::{sync::Arc, time::Instant};

use {
    serde::Serialize,
    serde_json::{Value, json},
    sqlx::SqlitePool,
    termvault_config::{KdfConfig, TermvaultConfig},
    termvault_vault::{BenchmarkParams, EncryptionEnvelope, benchmark::benchmark_or_default},
    tokio::sync::Mutex,
};

use crate::{
    backend::{BackendKind, StorageBackend, detect_backend},
    delegated::HostStore,
    error::Result,
    kv::KvStore,
    settings::{PBKDF2_ITERATIONS_SETTING, SettingsStore},
    types::StorageData,
};

/// Snapshot of the storage state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub backend: BackendKind,
    pub has_stored_data: bool,
    pub is_encrypted: bool,
    pub is_unlocked: bool,
    /// PBKDF2 iterations new saves will use (local backend only).
    pub iterations: u32,
}

pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    settings: SettingsStore,
    envelope: Arc<EncryptionEnvelope>,
    kdf: KdfConfig,
    /// Serializes save, clear and password changes.
    write_lock: Mutex<()>,
}

impl StorageService {
    /// Open (creating if needed) the database named by `config` and build the
    /// service over it.
    pub async fn open(
        config: &TermvaultConfig,
        host: Option<Arc<dyn HostStore>>,
    ) -> Result<Self> {
        let db_path = config.storage.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;
        crate::run_migrations(&pool).await?;

        tracing::debug!(path = %db_path.display(), "opened storage database");
        Self::with_pool(pool, config, host).await
    }

    /// Build the service over an already-migrated pool.
    pub async fn with_pool(
        pool: SqlitePool,
        config: &TermvaultConfig,
        host: Option<Arc<dyn HostStore>>,
    ) -> Result<Self> {
        let kv = KvStore::new(pool);
        let envelope = Arc::new(EncryptionEnvelope::new());
        let settings = SettingsStore::new(kv.clone(), config.logs.clone().into());
        let backend = detect_backend(host, kv, Arc::clone(&envelope)).await;

        let service = Self {
            backend,
            settings,
            envelope,
            kdf: config.kdf.clone(),
            write_lock: Mutex::new(()),
        };
        let iterations = service.resolve_iterations().await?;
        service.envelope.set_iterations(iterations);
        Ok(service)
    }

    /// Pick the PBKDF2 iteration count: fixed config value, then the persisted
    /// setting, then calibration when enabled, then the configured default.
    async fn resolve_iterations(&self) -> Result<u32> {
        if let Some(iterations) = self.kdf.iterations {
            return Ok(iterations.max(1));
        }
        if let Some(iterations) = self
            .settings
            .setting(PBKDF2_ITERATIONS_SETTING)
            .await?
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
        {
            return Ok(iterations);
        }
        if self.kdf.calibrate_on_startup {
            return self.calibrate().await;
        }
        Ok(self.kdf.default_iterations.max(1))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Iteration count applied to new encryptions.
    pub fn iterations(&self) -> u32 {
        self.envelope.iterations()
    }

    // ── Password state ──────────────────────────────────────────────────────

    /// Hold `password` for this session. Not checked until the next load;
    /// use [`verify_password`](Self::verify_password) to check up front.
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.set_password(Some(password)).await?;
        tracing::info!("storage unlocked");
        Ok(())
    }

    pub async fn lock(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.set_password(None).await?;
        tracing::info!("storage locked");
        Ok(())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.backend.is_unlocked().await
    }

    /// Check `password` against the stored data without unlocking.
    pub async fn verify_password(&self, password: &str) -> Result<()> {
        self.backend.verify_password(password).await
    }

    /// Re-encrypt the stored data under `new_password` and hold it.
    ///
    /// Requires the current password to be held when data is encrypted.
    pub async fn change_password(&self, new_password: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.change_password(new_password).await?;
        tracing::info!("storage password changed");
        Ok(())
    }

    // ── Connections ─────────────────────────────────────────────────────────

    pub async fn save(&self, data: &StorageData, use_password: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let started = Instant::now();
        self.backend.save(data, use_password).await?;
        self.record_timing(
            "storage.save",
            started,
            json!({"connections": data.connections.len(), "encrypted": use_password}),
        )
        .await;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<StorageData>> {
        let started = Instant::now();
        let data = self.backend.load().await?;
        if let Some(data) = &data {
            self.record_timing(
                "storage.load",
                started,
                json!({"connections": data.connections.len()}),
            )
            .await;
        }
        Ok(data)
    }

    pub async fn has_stored_data(&self) -> Result<bool> {
        self.backend.has_stored_data().await
    }

    pub async fn is_encrypted(&self) -> Result<bool> {
        self.backend.is_encrypted().await
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.clear().await
    }

    pub async fn status(&self) -> Result<StorageStatus> {
        Ok(StorageStatus {
            backend: self.backend.kind(),
            has_stored_data: self.backend.has_stored_data().await?,
            is_encrypted: self.backend.is_encrypted().await?,
            is_unlocked: self.backend.is_unlocked().await,
            iterations: self.envelope.iterations(),
        })
    }

    // ── Calibration ─────────────────────────────────────────────────────────

    /// Benchmark the host, persist the result as the `pbkdf2Iterations`
    /// setting and use it for new encryptions unless the config fixes a count.
    ///
    /// Existing ciphertext keeps decrypting: each envelope records its own
    /// iteration count.
    pub async fn calibrate(&self) -> Result<u32> {
        let params = BenchmarkParams::new(
            self.kdf.benchmark_target_secs,
            self.kdf.benchmark_max_total_secs,
            self.kdf.benchmark_max_rounds,
        );
        let iterations = benchmark_or_default(params, self.kdf.default_iterations).await;
        self.settings
            .update_setting(PBKDF2_ITERATIONS_SETTING, json!(iterations))
            .await?;

        if self.kdf.iterations.is_none() {
            self.envelope.set_iterations(iterations);
        }
        tracing::info!(iterations, "pbkdf2 iterations calibrated");
        Ok(iterations)
    }

    async fn record_timing(&self, name: &str, started: Instant, details: Value) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self.settings.record_metric(name, duration_ms, details).await {
            tracing::warn!(error = %e, name, "failed to record performance metric");
        }
    }
}
