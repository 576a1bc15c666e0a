//! Link resolution and entry chunk generation for the ixp index provider.
//!
//! The [`Engine`] owns a datastore of advertisements, a bounded cache of
//! entry chunks, and the mapping from multihash list roots to context ids.
//! Its [`MainLinkSystem`] resolves any CID to bytes: persisted blocks come
//! from the datastore, entry chunks from the cache, and a chunk that is not
//! cached triggers regeneration of its whole list through the injected
//! [`MultihashLister`].
//!
//! # Modules
//!
//! - [`linksys`] : the main, cache and vanilla link systems
//! - [`chunker`] : multihash iterator to backward-linked chunk list
//! - [`classify`] : structural advertisement detection
//! - [`resolver`] : list root to context id mapping
//! - [`flight`] : single-flight de-duplication of generation

pub mod chunker;
pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod flight;
pub mod linksys;
pub mod lister;
pub mod resolver;

pub use chunker::{generate_chunks, GeneratedChunks};
pub use classify::{classify, is_advertisement, NodeKind};
pub use config::EngineConfig;
pub use context::LinkContext;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
pub use flight::SingleFlight;
pub use linksys::{BlockWriter, CacheLinkSystem, LinkSystem, MainLinkSystem, VanillaLinkSystem};
pub use lister::{iter_multihashes, MultihashIterator, MultihashLister};
pub use resolver::{ContextResolver, DatastoreContextMap};
