//! SQLite-backed key-value store (string key → JSON value).
//!
//! Every value is stored as JSON text. Multi-key writes go through
//! [`KvStore::write_batch`], which commits all of them in one transaction.

use {
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    sqlx::SqlitePool,
};

use crate::{error::Result, types::now_ms};

/// One write inside a [`KvStore::write_batch`].
#[derive(Debug, Clone)]
pub enum KvOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl KvOp {
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        Self::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Persistent JSON key-value store.
#[derive(Debug, Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a value by key.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    /// Get a value and deserialize it.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get(key)
            .await?
            .map(serde_json::from_value)
            .transpose()?)
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Set a value. Inserts or replaces the entry.
    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Serialize and set a value.
    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_value(value)?).await
    }

    /// Delete a key. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply all `ops` atomically, in order.
    pub async fn write_batch(&self, ops: Vec<KvOp>) -> Result<()> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    sqlx::query(UPSERT)
                        .bind(key)
                        .bind(serde_json::to_string(&value)?)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                },
                KvOp::Delete { key } => {
                    sqlx::query("DELETE FROM kv_store WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                },
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// All keys, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT key FROM kv_store ORDER BY key")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

pub(crate) const UPSERT: &str = r#"INSERT INTO kv_store (key, value, updated_at)
   VALUES (?, ?, ?)
   ON CONFLICT(key) DO UPDATE SET
     value = excluded.value,
     updated_at = excluded.updated_at"#;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::test_support::test_pool, serde_json::json};

    #[tokio::test]
    async fn set_and_get() {
        let kv = KvStore::new(test_pool().await);
        kv.set("a", &json!({"x": 1})).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert!(kv.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn get_missing() {
        let kv = KvStore::new(test_pool().await);
        assert!(kv.get("missing").await.unwrap().is_none());
        assert!(!kv.contains("missing").await.unwrap());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let kv = KvStore::new(test_pool().await);
        kv.set("k", &json!("v1")).await.unwrap();
        kv.set("k", &json!("v2")).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(json!("v2")));
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let kv = KvStore::new(test_pool().await);
        kv.set_as("nums", &vec![3, 2, 1]).await.unwrap();
        let nums: Vec<i32> = kv.get_as("nums").await.unwrap().unwrap();
        assert_eq!(nums, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let kv = KvStore::new(test_pool().await);
        kv.set("k", &json!(1)).await.unwrap();
        assert!(kv.remove("k").await.unwrap());
        assert!(!kv.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        let kv = KvStore::new(test_pool().await);
        kv.set("old", &json!("legacy")).await.unwrap();

        kv.write_batch(vec![
            KvOp::put("a", json!(1)),
            KvOp::put("b", json!(2)),
            KvOp::delete("old"),
            KvOp::put("a", json!(3)),
        ])
        .await
        .unwrap();

        assert_eq!(kv.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(kv.get("a").await.unwrap(), Some(json!(3)));
    }
}
