//! Bounded, resizable LRU cache of entry chunks.
//!
//! Chunks are cache-only: they are never written to the datastore and are
//! regenerated if evicted. Capacity is managed explicitly. A generation run
//! doubles the capacity whenever the cache is full and, once the last
//! concurrently active run finishes, the capacity shrinks back to the
//! number of cached chunks.
//!
//! All state, including the capacity, sits behind one mutex, so the
//! check-and-double in [`GenerationReservation::grow_if_full`] is atomic with
//! respect to every other cache operation.

use hashlink::LruCache;
use ixp_types::Cid;
use parking_lot::Mutex;
use tracing::{debug, info};

struct CacheState {
    lru: LruCache<Cid, Vec<u8>>,
    /// Generation runs currently holding a reservation.
    active_runs: usize,
    /// Some run grew the capacity since the last shrink.
    grown: bool,
}

/// In-memory LRU of chunk bytes keyed by CID.
pub struct BoundedChunkCache {
    state: Mutex<CacheState>,
}

impl BoundedChunkCache {
    /// Create an empty cache holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                lru: LruCache::new(capacity),
                active_runs: 0,
                grown: false,
            }),
        }
    }

    /// Fetch a chunk, marking it most recently used.
    pub fn get(&self, cid: &Cid) -> Option<Vec<u8>> {
        self.state.lock().lru.get(cid).cloned()
    }

    /// Whether a chunk is cached. Does not touch recency.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.state.lock().lru.contains_key(cid)
    }

    /// Insert a chunk, evicting the least recently used one if full.
    pub fn put(&self, cid: Cid, data: Vec<u8>) {
        let mut state = self.state.lock();
        if state.lru.len() >= state.lru.capacity() && !state.lru.contains_key(&cid) {
            debug!(
                %cid,
                cap = state.lru.capacity(),
                "cache full, evicting least recently used chunk"
            );
        }
        state.lru.insert(cid, data);
    }

    /// Evict one chunk. Returns `true` if it was cached.
    pub fn remove(&self, cid: &Cid) -> bool {
        self.state.lock().lru.remove(cid).is_some()
    }

    /// Number of cached chunks.
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Whether no chunk is cached.
    pub fn is_empty(&self) -> bool {
        self.state.lock().lru.is_empty()
    }

    /// Current capacity, in chunks.
    pub fn cap(&self) -> usize {
        self.state.lock().lru.capacity()
    }

    /// Change the capacity. Shrinking evicts least recently used chunks until
    /// `len <= new_cap`; growing never evicts. Returns the number evicted.
    pub fn resize(&self, new_cap: usize) -> usize {
        let mut state = self.state.lock();
        let before = state.lru.len();
        state.lru.set_capacity(new_cap);
        let evicted = before - state.lru.len();
        debug!(new_cap, evicted, "resized chunk cache");
        evicted
    }

    /// Drop every cached chunk, keeping the capacity. Returns the number
    /// removed.
    pub fn purge(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.lru.len();
        state.lru.clear();
        removed
    }

    /// Register a generation run. Capacity grown through the returned
    /// reservation is reclaimed when the last active reservation is released.
    pub fn begin_generation(&self) -> GenerationReservation<'_> {
        self.state.lock().active_runs += 1;
        GenerationReservation {
            cache: self,
            grew: false,
            released: false,
        }
    }
}

impl std::fmt::Debug for BoundedChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedChunkCache")
            .field("len", &state.lru.len())
            .field("cap", &state.lru.capacity())
            .field("active_runs", &state.active_runs)
            .finish()
    }
}

/// A generation run's claim on the cache's capacity bookkeeping.
///
/// Released explicitly with [`release`](GenerationReservation::release) or
/// on drop, so an aborted run still gives back the headroom it allocated.
pub struct GenerationReservation<'a> {
    cache: &'a BoundedChunkCache,
    grew: bool,
    released: bool,
}

impl GenerationReservation<'_> {
    /// Double the capacity if the cache is full. Returns the new capacity
    /// when a resize happened.
    pub fn grow_if_full(&mut self) -> Option<usize> {
        let mut state = self.cache.state.lock();
        let cap = state.lru.capacity();
        if state.lru.len() < cap {
            return None;
        }
        let new_cap = cap.saturating_mul(2).max(1);
        state.lru.set_capacity(new_cap);
        state.grown = true;
        self.grew = true;
        debug!(old_cap = cap, new_cap, "chunk cache full, doubled capacity");
        Some(new_cap)
    }

    /// Whether this run grew the cache.
    pub fn grew(&self) -> bool {
        self.grew
    }

    /// End the run. Returns the shrunk capacity if this was the last active
    /// run and the cache had been grown.
    pub fn release(mut self) -> Option<usize> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Option<usize> {
        if self.released {
            return None;
        }
        self.released = true;

        let mut state = self.cache.state.lock();
        state.active_runs = state.active_runs.saturating_sub(1);
        if state.active_runs > 0 || !state.grown {
            return None;
        }
        // Never shrink to zero: a zero-capacity cache drops every insert.
        let new_cap = state.lru.len().max(1);
        state.lru.set_capacity(new_cap);
        state.grown = false;
        info!(new_cap, "link cache expanded to hold links, shrunk to fit");
        Some(new_cap)
    }
}

impl Drop for GenerationReservation<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
