use super::CheckpointStore;
use crate::errors::CheckpointError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory checkpoint store.
///
/// Clones share the same underlying map, so a test can keep a handle while
/// a deployment owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryCheckpointStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Overwrites an entry with raw bytes, bypassing the typed layer.
    pub fn put_raw(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.lock().insert(name.to_string(), bytes.into());
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        self.entries.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        Ok(self.entries.lock().get(name).cloned())
    }

    async fn remove(&self, name: &str) -> Result<(), CheckpointError> {
        self.entries.lock().remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_basic_ops() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.is_empty());

        store.save("a", b"1").await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.load("b").await.unwrap(), None);
        assert_eq!(store.list().await.unwrap(), vec!["a".to_string()]);

        store.remove("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = InMemoryCheckpointStore::new();
        let handle = store.clone();
        store.save("x", b"{}").await.unwrap();
        assert_eq!(handle.len(), 1);
    }
}
