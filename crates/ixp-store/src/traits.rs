use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

/// Durable key/value store.
///
/// All implementations must satisfy these invariants:
/// - A missing key reads as `Ok(None)`; errors are reserved for faults.
/// - `put` overwrites. Content-addressed keys make overwrites idempotent.
/// - Concurrent access from unrelated keys is always safe.
/// - The store never interprets values.
pub trait Datastore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Check whether `key` exists.
    fn has(&self, key: &str) -> StoreResult<bool>;

    /// Delete `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Like [`get`](Datastore::get), but a missing key is
    /// [`StoreError::NotFound`].
    fn require(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl<T: Datastore + ?Sized> Datastore for Arc<T> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).put(key, value)
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        (**self).has(key)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }
}
