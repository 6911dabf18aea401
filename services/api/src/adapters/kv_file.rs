//! services/api/src/adapters/kv_file.rs
//!
//! A `KeyValueStore` that keeps one file per key in a data directory.
//! Writes go to a temporary file first and are renamed into place, so a crash
//! never leaves a half-written value behind.

use async_trait::async_trait;
use onyx_core::ports::{KeyValueStore, StorageError};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const EXTENSION: &str = "json";

/// `ENOSPC`: the device has no space left.
const NO_SPACE_LEFT: i32 = 28;

#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Opens the store, creating `dir` if it does not exist yet.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(storage_error)?;
        debug!(dir = %dir.display(), "Opened file key-value store");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Backend(format!("invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }
}

fn storage_error(e: io::Error) -> StorageError {
    if e.raw_os_error() == Some(NO_SPACE_LEFT) {
        StorageError::QuotaExceeded
    } else {
        StorageError::Backend(e.to_string())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)?).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).await.map_err(storage_error)?;
        fs::rename(&tmp, &path).await.map_err(storage_error)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(storage_error)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(storage_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();
        store.set_item("onyx_subjects", "[]").await.unwrap();
        store.set_item("onyx_sessions_2024-03-01", "[1]").await.unwrap();

        let reopened = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get_item("onyx_subjects").await.unwrap().as_deref(),
            Some("[]")
        );
        assert_eq!(
            reopened.keys().await.unwrap(),
            vec!["onyx_sessions_2024-03-01".to_string(), "onyx_subjects".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_keys_and_removals_are_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get_item("absent").await.unwrap(), None);
        store.remove_item("absent").await.unwrap();
    }

    #[tokio::test]
    async fn path_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.set_item("../escape", "x").await,
            Err(StorageError::Backend(_))
        ));
    }
}
