//! Storage backends for the ixp index provider.
//!
//! Two kinds of store sit underneath the link systems:
//!
//! - a [`Datastore`]: durable key/value storage for advertisements and the
//!   context-id mapping, keyed by string (CIDs use their string form);
//! - the [`BoundedChunkCache`]: an in-memory LRU of entry chunks keyed by
//!   CID whose capacity can change at runtime.
//!
//! # Backends
//!
//! - [`InMemoryDatastore`]: `HashMap`-based, lives as long as the process
//! - [`FsDatastore`]: one file per key under a root directory
//!
//! # Design Rules
//!
//! 1. Values are opaque; stores never interpret them.
//! 2. A missing key is `Ok(None)`, never an error.
//! 3. All I/O errors are propagated, never silently ignored.
//! 4. Every store is safe to share across threads.

pub mod cache;
pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use cache::{BoundedChunkCache, GenerationReservation};
pub use error::{StoreError, StoreResult};
pub use fs::FsDatastore;
pub use memory::InMemoryDatastore;
pub use traits::Datastore;
