use super::{CasOutcome, SharedStore, StoreError, Versioned};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-process authoritative store.
///
/// Every mutation takes the write lock, so the store serialises all writers
/// on the host. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Versioned>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys ever written, tombstones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous form of [`SharedStore::put`]; the in-process store never suspends.
    pub fn set(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        match self.write_entry(key, None, value)? {
            CasOutcome::Committed(version) | CasOutcome::Conflict(version) => Ok(version),
        }
    }

    fn write_entry(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let entry = entries.entry(key.to_string()).or_default();

        if let Some(expected) = expected {
            if entry.version != expected {
                return Ok(CasOutcome::Conflict(entry.version));
            }
        }

        entry.version += 1;
        entry.value = value;
        Ok(CasOutcome::Committed(entry.version))
    }
}

impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned().unwrap_or_else(Versioned::absent))
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        self.set(key, value)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        self.write_entry(key, Some(expected), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_key_reads_absent() {
        let store = MemoryStore::new();
        let read = store.get("missing").await.unwrap();
        assert_eq!(read, Versioned::absent());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_is_last_writer_wins() {
        let store = MemoryStore::new();
        store.put("k", Some("first".into())).await.unwrap();
        let version = store.put("k", Some("second".into())).await.unwrap();

        let read = store.get("k").await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(read.value.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_version() {
        let store = MemoryStore::new();
        let v1 = store.put("k", Some("a".into())).await.unwrap();

        let first = store.compare_and_swap("k", v1, Some("b".into())).await.unwrap();
        assert_eq!(first, CasOutcome::Committed(v1 + 1));

        // Second writer still holds the old version
        let second = store.compare_and_swap("k", v1, Some("c".into())).await.unwrap();
        assert_eq!(second, CasOutcome::Conflict(v1 + 1));
        assert_eq!(store.get("k").await.unwrap().value.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_clearing_keeps_version_monotonic() {
        let store = MemoryStore::new();
        store.put("k", Some("a".into())).await.unwrap();
        let cleared = store.put("k", None).await.unwrap();

        let read = store.get("k").await.unwrap();
        assert_eq!(read.version, cleared);
        assert!(read.value.is_none());

        // A writer that read before the clear must not resurrect the value
        let stale = store.compare_and_swap("k", 1, Some("x".into())).await.unwrap();
        assert_eq!(stale, CasOutcome::Conflict(2));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("k", Some("shared".into())).await.unwrap();
        assert_eq!(other.get("k").await.unwrap().value.as_deref(), Some("shared"));
        assert_eq!(other.len(), 1);
    }
}
