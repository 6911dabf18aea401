//! services/api/src/adapters/kv_memory.rs
//!
//! A `KeyValueStore` held entirely in process memory, with an optional byte
//! quota that mimics a browser's local-storage limit.

use async_trait::async_trait;
use onyx_core::ports::{KeyValueStore, StorageError};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
    /// Upper bound on the summed length of all keys and values.
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently in use.
    pub async fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Test double that rejects writes to keys starting with a chosen prefix.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FailingKeyValueStore {
        inner: MemoryKeyValueStore,
        failing_prefix: Mutex<Option<String>>,
    }

    impl FailingKeyValueStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn fail_writes_to(&self, prefix: &str) {
            *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
        }

        pub(crate) fn heal(&self) {
            *self.failing_prefix.lock().unwrap() = None;
        }
    }

    #[async_trait]
    impl KeyValueStore for FailingKeyValueStore {
        async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            let failing = self
                .failing_prefix
                .lock()
                .unwrap()
                .as_deref()
                .is_some_and(|prefix| key.starts_with(prefix));
            if failing {
                return Err(StorageError::Backend(format!("write to {key} refused")));
            }
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key).await
        }

        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys().await
        }
    }
}
