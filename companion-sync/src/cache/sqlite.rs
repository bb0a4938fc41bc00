//! SQLite cache backend for on-device persistence
//!
//! One `cache_entries` table keyed by cache key. Every write is a single
//! upsert statement, so a reader never sees half an envelope.

use super::backend::CacheBackend;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::time::Duration;

/// Configuration for the local cache database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file
    pub db_path: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to enable WAL mode
    pub enable_wal: bool,
    /// Whether to overwrite freed pages, so cleared attendee data does not
    /// linger in the file after logout
    pub enable_secure_delete: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "companion_cache.db".to_string(),
            max_connections: 5,
            enable_wal: true,
            enable_secure_delete: true,
        }
    }
}

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if needed) the cache database
    pub async fn open(config: &StorageConfig) -> SyncResult<Self> {
        let mut options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        if config.enable_wal {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // secure_delete is per connection, so it is applied on every connect.
        let secure_delete = config.enable_secure_delete;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if secure_delete {
                        sqlx::query("PRAGMA secure_delete = ON")
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        let backend = Self { pool };
        backend.initialize_schema().await?;

        tracing::debug!(db_path = %config.db_path, "Opened cache database");

        Ok(backend)
    }

    async fn initialize_schema(&self) -> SyncResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close database connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> SyncResult<usize> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() as usize)
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM cache_entries ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.try_get("key")?);
        }
        Ok(keys)
    }
}
