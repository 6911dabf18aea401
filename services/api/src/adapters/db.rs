//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, a `KeyValueStore` backed by a
//! single PostgreSQL table. It handles all interactions with the database
//! using `sqlx`.

use async_trait::async_trait;
use onyx_core::ports::{KeyValueStore, StorageError};
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `KeyValueStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ValueRecord {
    value: String,
}

#[derive(FromRow)]
struct KeyRecord {
    key: String,
}

fn backend_error(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for DbAdapter {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let record = sqlx::query_as::<_, ValueRecord>("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(record.map(|r| r.value))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // 53100: disk_full
            let disk_full = matches!(
                &e,
                sqlx::Error::Database(db) if db.code().as_deref() == Some("53100")
            );
            if disk_full {
                StorageError::QuotaExceeded
            } else {
                backend_error(e)
            }
        })?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let records = sqlx::query_as::<_, KeyRecord>("SELECT key FROM kv_store ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }
}
