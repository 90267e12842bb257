//! Relocation of the legacy storage-metadata key.
//!
//! Older releases kept [`StorageMetadata`](crate::types::StorageMetadata) under
//! [`LEGACY_METADATA_KEY`]. The first access copies it to [`METADATA_KEY`] and
//! removes the legacy key in one transaction, so a second run finds nothing to
//! do.

use crate::{
    error::Result,
    kv::{KvStore, UPSERT},
    types::{LEGACY_METADATA_KEY, METADATA_KEY, now_ms},
};

/// What a migration run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy key present.
    NothingToMigrate,
    /// Legacy value copied to the current key, legacy key removed.
    Migrated,
    /// Current key already set; the stale legacy key was removed.
    DroppedStale,
}

/// Move `legacy` to `current` unless `current` already exists.
///
/// The reads and the writes share one transaction, so a concurrent writer
/// can't slip in between the existence check and the copy.
pub async fn migrate_key(kv: &KvStore, legacy: &str, current: &str) -> Result<MigrationOutcome> {
    let mut tx = kv.pool().begin().await?;

    let Some(raw) = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
        .bind(legacy)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(MigrationOutcome::NothingToMigrate);
    };

    let current_exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM kv_store WHERE key = ?")
        .bind(current)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

    if !current_exists {
        sqlx::query(UPSERT)
            .bind(current)
            .bind(raw)
            .bind(now_ms())
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM kv_store WHERE key = ?")
        .bind(legacy)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if current_exists {
        tracing::info!(legacy, current, "removed stale legacy key");
        Ok(MigrationOutcome::DroppedStale)
    } else {
        tracing::info!(legacy, current, "migrated legacy key");
        Ok(MigrationOutcome::Migrated)
    }
}

/// Migrate the storage-metadata key.
pub async fn migrate_legacy_metadata(kv: &KvStore) -> Result<MigrationOutcome> {
    migrate_key(kv, LEGACY_METADATA_KEY, METADATA_KEY).await
}
