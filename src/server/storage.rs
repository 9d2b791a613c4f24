//! Server-side key-value row storage.
//!
//! Rows live in a single SQLite table:
//! ```text
//! kv_store(key TEXT PRIMARY KEY, value TEXT, updated_at TEXT)
//! ```
//!
//! `value` holds the JSON text of the row's value. Upserts replace the whole
//! value, so the last write for a key wins.

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors that can occur during row storage operations.
#[derive(Debug)]
pub enum KvStoreError {
    /// I/O error preparing the database location.
    IoError(PathBuf, io::Error),
    /// Error from the database.
    Database(sqlx::Error),
    /// Error applying schema migrations.
    Migration(sqlx::migrate::MigrateError),
    /// A stored value is not valid JSON.
    CorruptValue(String, serde_json::Error),
}

impl std::fmt::Display for KvStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KvStoreError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            KvStoreError::Database(e) => write!(f, "Database error: {}", e),
            KvStoreError::Migration(e) => write!(f, "Migration failed: {}", e),
            KvStoreError::CorruptValue(key, e) => {
                write!(f, "Stored value for '{}' is not valid JSON: {}", key, e)
            }
        }
    }
}

impl std::error::Error for KvStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KvStoreError::IoError(_, e) => Some(e),
            KvStoreError::Database(e) => Some(e),
            KvStoreError::Migration(e) => Some(e),
            KvStoreError::CorruptValue(_, e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for KvStoreError {
    fn from(e: sqlx::Error) -> Self {
        KvStoreError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for KvStoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        KvStoreError::Migration(e)
    }
}

/// SQLite-backed key-value rows.
#[derive(Debug, Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, KvStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KvStoreError::IoError(parent.to_path_buf(), e))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, KvStoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((text,)) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| KvStoreError::CorruptValue(key.to_string(), e)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the value stored under `key`.
    pub async fn upsert(&self, key: &str, value: &Value) -> Result<(), KvStoreError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the number of stored rows.
    pub async fn count(&self) -> Result<i64, KvStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
