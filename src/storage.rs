//! Key-value persistence
//!
//! [`FjallStore`] keeps settings on disk across sessions; [`MemoryStore`]
//! holds them for the lifetime of the process only. Both store JSON strings.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use fjall::Keyspace;
use serde::{Serialize, de::DeserializeOwned};
use tokio::task;
use tracing::warn;

use crate::error::StorageError;
use crate::lock;
use crate::providers::KeyValueStore;

pub const SENSITIVITY_KEY: &str = "pollencast.sensitivity";
pub const LOCATION_SETTINGS_KEY: &str = "pollencast.location_settings";

/// On-disk store backed by a fjall keyspace
pub struct FjallStore {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("settings", fjall::KeyspaceCreateOptions::default)?;
        Ok(FjallStore { store: items })
    }
}

#[async_trait]
impl KeyValueStore for FjallStore {
    #[tracing::instrument(name = "read_setting", level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes = task::spawn_blocking(move || get_from_store(store, key_bytes))
            .await
            .map_err(|e| StorageError::unavailable(e.to_string()))?
            .map_err(|e| StorageError::unavailable(e.to_string()))?;

        maybe_bytes
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| StorageError::unavailable(format!("corrupt value for {key}: {e}")))
            })
            .transpose()
    }

    #[tracing::instrument(name = "write_setting", level = "debug", skip(self, value))]
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();

        task::spawn_blocking(move || store.insert(key, value.into_bytes()))
            .await
            .map_err(|e| StorageError::unavailable(e.to_string()))?
            .map(|_| ())
            .map_err(|e| StorageError::unavailable(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();

        task::spawn_blocking(move || store.remove(key))
            .await
            .map_err(|e| StorageError::unavailable(e.to_string()))?
            .map(|_| ())
            .map_err(|e| StorageError::unavailable(e.to_string()))
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Read and decode a JSON value. Undecodable data is logged and treated as absent.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Discarding unreadable value for {}: {}", key, e);
            Ok(None)
        }
    }
}

/// Encode and write a JSON value
pub async fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)
        .map_err(|e| StorageError::rejected(format!("failed to encode {key}: {e}")))?;
    store.set(key, raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensitivityProfile;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_json_reads_as_absent() {
        let store = MemoryStore::new();
        store.set(SENSITIVITY_KEY, "{not json".to_string()).await.unwrap();

        let loaded: Option<SensitivityProfile> = load_json(&store, SENSITIVITY_KEY).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_fjall_store_read_write() {
        let dir = std::env::temp_dir().join(format!("pollencast-store-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let store = FjallStore::open(&dir).unwrap();
        assert_eq!(store.get(SENSITIVITY_KEY).await.unwrap(), None);

        save_json(&store, SENSITIVITY_KEY, &SensitivityProfile::uniform(7))
            .await
            .unwrap();
        let loaded: Option<SensitivityProfile> = load_json(&store, SENSITIVITY_KEY).await.unwrap();
        assert_eq!(loaded, Some(SensitivityProfile::uniform(7)));

        store.remove(SENSITIVITY_KEY).await.unwrap();
        assert_eq!(store.get(SENSITIVITY_KEY).await.unwrap(), None);
    }
}
