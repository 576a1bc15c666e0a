use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::traits::Datastore;

/// In-memory, HashMap-based datastore.
///
/// Data lives as long as the store does, so anything kept here (including
/// the context-id mapping) is lost on restart. Values are cloned on
/// read/write.
#[derive(Default)]
pub struct InMemoryDatastore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDatastore {
    /// Create an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no key is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Datastore for InMemoryDatastore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatastore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemoryDatastore::new();
        store.put("bafy-one", b"hello world").unwrap();
        assert_eq!(store.get("bafy-one").unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryDatastore::new();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn require_missing_is_not_found() {
        let store = InMemoryDatastore::new();
        let err = store.require("missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(k) if k == "missing"));
    }

    #[test]
    fn put_overwrites() {
        let store = InMemoryDatastore::new();
        store.put("k", b"first").unwrap();
        store.put("k", b"second").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"second");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn has_and_delete() {
        let store = InMemoryDatastore::new();
        store.put("k", b"v").unwrap();
        assert!(store.has("k").unwrap());
        assert!(store.delete("k").unwrap());
        assert!(!store.has("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_on_distinct_keys() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryDatastore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let key = format!("key-{i}");
                    store.put(&key, key.as_bytes()).unwrap();
                    assert_eq!(store.get(&key).unwrap().unwrap(), key.as_bytes());
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryDatastore::new();
        store.put("x", b"y").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryDatastore"));
        assert!(debug.contains("key_count"));
    }
}
