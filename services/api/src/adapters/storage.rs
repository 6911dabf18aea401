//! services/api/src/adapters/storage.rs
//!
//! JSON persistence on top of any `KeyValueStore`: typed load/save, recovery
//! from corrupted values, and a one-shot cleanup-and-retry when the backend
//! runs out of space.

use chrono::{Duration, NaiveDate};
use onyx_core::ports::{Clock, KeyValueStore, PortError, PortResult, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const KEY_PREFIX: &str = "onyx_";
pub const SUBJECTS_KEY: &str = "onyx_subjects";
pub const TIMERS_KEY: &str = "onyx_active_timers";
pub const TIMER_COUNTER_KEY: &str = "onyx_timer_counter";
pub const SESSIONS_KEY_PREFIX: &str = "onyx_sessions_";

/// Key holding the study sessions recorded on `date`.
pub fn sessions_key(date: NaiveDate) -> String {
    format!("{SESSIONS_KEY_PREFIX}{}", date.format("%Y-%m-%d"))
}

/// Summary of what the backend currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub total_keys: usize,
    pub onyx_keys: usize,
    /// Sum of the stored value lengths of all `onyx_` keys, in bytes.
    pub estimated_size: usize,
}

pub struct JsonStorage {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    retention_days: u32,
}

fn persistence(key: &str, e: StorageError) -> PortError {
    PortError::Persistence(format!("{key}: {e}"))
}

impl JsonStorage {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, retention_days: u32) -> Self {
        Self {
            kv,
            clock,
            retention_days,
        }
    }

    /// Reads and decodes `key`, falling back to `T::default()` when the key is
    /// missing. A value that fails to decode is removed before the fallback.
    pub async fn load<T>(&self, key: &str) -> PortResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.kv.get_item(key).await.map_err(|e| persistence(key, e))? else {
            debug!(key, "Key not found; using default");
            return Ok(T::default());
        };
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(key, "Corrupted data, discarding: {}", e);
                if let Err(remove_err) = self.kv.remove_item(key).await {
                    error!(key, "Failed to remove corrupted data: {}", remove_err);
                }
                Ok(T::default())
            }
        }
    }

    /// Encodes and writes `value`. On a quota failure, expired session records are
    /// purged and the write is attempted exactly once more.
    pub async fn save<T>(&self, key: &str, value: &T) -> PortResult<()>
    where
        T: Serialize + ?Sized,
    {
        let serialized =
            serde_json::to_string(value).map_err(|e| PortError::Unexpected(e.to_string()))?;
        match self.kv.set_item(key, &serialized).await {
            Ok(()) => {
                debug!(key, bytes = serialized.len(), "Saved");
                Ok(())
            }
            Err(StorageError::QuotaExceeded) => {
                warn!(key, "Storage quota exceeded; cleaning up old sessions");
                self.cleanup_old_sessions().await;
                self.kv.set_item(key, &serialized).await.map_err(|e| {
                    error!(key, "Save failed after cleanup: {}", e);
                    persistence(key, e)
                })?;
                debug!(key, "Saved after cleanup");
                Ok(())
            }
            Err(e) => {
                error!(key, "Save failed: {}", e);
                Err(persistence(key, e))
            }
        }
    }

    /// All keys owned by this application.
    pub async fn onyx_keys(&self) -> PortResult<Vec<String>> {
        Ok(self
            .kv
            .keys()
            .await
            .map_err(|e| persistence("*", e))?
            .into_iter()
            .filter(|k| k.starts_with(KEY_PREFIX))
            .collect())
    }

    pub async fn stats(&self) -> PortResult<StorageStats> {
        let total_keys = self.kv.keys().await.map_err(|e| persistence("*", e))?.len();
        let owned = self.onyx_keys().await?;
        let mut estimated_size = 0;
        for key in &owned {
            if let Some(value) = self.kv.get_item(key).await.map_err(|e| persistence(key, e))? {
                estimated_size += value.len();
            }
        }
        Ok(StorageStats {
            total_keys,
            onyx_keys: owned.len(),
            estimated_size,
        })
    }

    /// Deletes session keys dated before the retention window. Failures are
    /// logged; returns the number of keys removed.
    pub async fn cleanup_old_sessions(&self) -> usize {
        let cutoff = self.clock.now().date_naive() - Duration::days(i64::from(self.retention_days));
        let keys = match self.kv.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Cleanup could not list keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        let mut checked = 0;
        for key in keys {
            let Some(date_str) = key.strip_prefix(SESSIONS_KEY_PREFIX) else {
                continue;
            };
            checked += 1;
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                match self.kv.remove_item(&key).await {
                    Ok(()) => removed += 1,
                    Err(e) => error!(key, "Cleanup failed to remove key: {}", e),
                }
            }
        }
        debug!(checked, removed, "Session cleanup finished");
        removed
    }
}
