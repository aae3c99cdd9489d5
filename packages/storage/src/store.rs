//! The object-store seam.

use async_trait::async_trait;

use crate::StorageError;

/// What a `put` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The bytes were written.
    Written,
    /// An identical object already existed; nothing was transferred.
    Unchanged,
}

/// A flat key/value store of byte objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the backend fails.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<PutOutcome, StorageError>;

    /// Fetches the object stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no such object, or
    /// [`StorageError::Backend`] if the backend fails.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Lists every key starting with `prefix`, in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
