//! In-process object store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::StorageError;
use crate::store::{ObjectStore, PutOutcome};

/// An [`ObjectStore`] backed by a map in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns `true` if no object is stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Overwrites an object without any checks.
    pub async fn insert_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().await.insert(key.into(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<PutOutcome, StorageError> {
        let mut objects = self.objects.write().await;
        if objects.get(key).is_some_and(|existing| *existing == bytes) {
            log::debug!("{key}: skipped (unchanged)");
            return Ok(PutOutcome::Unchanged);
        }
        objects.insert(key.to_string(), bytes);
        Ok(PutOutcome::Written)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list() {
        let store = MemoryStore::new();
        assert_eq!(
            store.put("a/1", b"one".to_vec()).await.unwrap(),
            PutOutcome::Written
        );
        store.put("a/2", b"two".to_vec()).await.unwrap();
        store.put("b/1", b"three".to_vec()).await.unwrap();

        assert_eq!(store.get("a/2").await.unwrap(), b"two");
        assert_eq!(store.list("a/").await.unwrap(), vec!["a/1", "a/2"]);
        assert_eq!(store.list("").await.unwrap().len(), 3);
        assert!(store.list("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StorageError::NotFound { key }) if key == "nope"
        ));
    }

    #[tokio::test]
    async fn identical_put_is_skipped() {
        let store = MemoryStore::new();
        store.put("k", b"x".to_vec()).await.unwrap();
        assert_eq!(
            store.put("k", b"x".to_vec()).await.unwrap(),
            PutOutcome::Unchanged
        );
        assert_eq!(
            store.put("k", b"y".to_vec()).await.unwrap(),
            PutOutcome::Written
        );
        assert_eq!(store.len().await, 1);
    }
}
