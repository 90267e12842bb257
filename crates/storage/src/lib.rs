//! Encrypted persistence for saved connection profiles.
//!
//! The connection list goes through a [`StorageBackend`]: either a host store
//! that encrypts on its own side ([`DelegatedBackend`]) or the local SQLite
//! key-value store with the AES-256-GCM envelope ([`LocalBackend`]). Settings
//! and logs live in the same local store, in plaintext. [`StorageService`] ties
//! the pieces together.

pub mod backend;
pub mod delegated;
pub mod error;
pub mod kv;
pub mod local;
pub mod migration;
pub mod service;
pub mod settings;
pub mod types;

pub use {
    backend::{BackendKind, StorageBackend},
    delegated::{DelegatedBackend, HostStore},
    error::{Error, ErrorKind, Result},
    kv::{KvOp, KvStore},
    local::LocalBackend,
    migration::MigrationOutcome,
    service::{StorageService, StorageStatus},
    settings::{
        ActionLogEntry, CustomScript, LogLimits, PerformanceMetric, SettingsEvent, SettingsStore,
    },
    types::{Connection, StorageData, StorageMetadata},
};

/// Run database migrations for the key-value store.
///
/// Creates the `kv_store` table. Call once at startup before building a
/// [`StorageService`] over the pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
