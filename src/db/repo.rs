//! Repository for persisted cache entries.

use crate::cache::{CacheEntry, CacheKey, CacheValue};
use crate::domain::TimeMs;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A cache entry read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    pub key: CacheKey,
    pub value: CacheValue,
    pub fetched_at: TimeMs,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Upsert entries in one transaction.
    ///
    /// # Errors
    /// Returns an error if a value cannot be encoded or the write fails.
    pub async fn save_cache_entries(
        &self,
        entries: &[(CacheKey, CacheEntry)],
    ) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for (key, entry) in entries {
            let value_json = serde_json::to_string(&entry.value)?;
            sqlx::query(
                r#"
                INSERT INTO cache_entries (key, value_json, fetched_at_ms, updated_at_ms)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    fetched_at_ms = excluded.fetched_at_ms,
                    updated_at_ms = excluded.updated_at_ms
                "#,
            )
            .bind(key.to_string())
            .bind(value_json)
            .bind(entry.fetched_at.as_ms())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(entries.len())
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_cache_entries(&self, keys: &[CacheKey]) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for key in keys {
            let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(key.to_string())
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    /// Load every readable entry. Rows whose key or value no longer parse
    /// are skipped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load_cache_entries(&self) -> Result<Vec<PersistedEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, value_json, fetched_at_ms FROM cache_entries ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_key: String = row.get("key");
            let key = match raw_key.parse::<CacheKey>() {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping persisted cache row: {}", e);
                    continue;
                }
            };
            let value_json: String = row.get("value_json");
            let value = match serde_json::from_str::<CacheValue>(&value_json) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Skipping persisted cache row {}: {}", raw_key, e);
                    continue;
                }
            };
            entries.push(PersistedEntry {
                key,
                value,
                fetched_at: TimeMs::new(row.get("fetched_at_ms")),
            });
        }
        Ok(entries)
    }
}
