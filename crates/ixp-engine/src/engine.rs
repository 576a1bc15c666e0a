//! The engine facade.
//!
//! [`EngineBuilder`] assembles the datastore, the chunk cache and the
//! context-id mapping from an [`EngineConfig`] and fixes the multihash
//! lister. The resulting [`Engine`] hands out the three link systems over
//! those stores and carries the publisher-side operations: generating a
//! list up front and recording or removing its context mapping.

use std::sync::Arc;

use ixp_store::{BoundedChunkCache, Datastore, FsDatastore, InMemoryDatastore};
use ixp_types::{Cid, ContextId};
use tracing::info;

use crate::chunker::GeneratedChunks;
use crate::config::EngineConfig;
use crate::context::LinkContext;
use crate::error::EngineResult;
use crate::linksys::{CacheLinkSystem, MainLinkSystem, VanillaLinkSystem};
use crate::lister::MultihashLister;
use crate::resolver::{ContextResolver, DatastoreContextMap};

/// Owns the stores and hands out the three link systems over them.
pub struct Engine {
    config: EngineConfig,
    datastore: Arc<dyn Datastore>,
    cache: Arc<BoundedChunkCache>,
    context_map: DatastoreContextMap,
    main: MainLinkSystem,
}

impl Engine {
    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The resolution entry point.
    pub fn link_system(&self) -> &MainLinkSystem {
        &self.main
    }

    /// Direct access to the chunk cache, without generation.
    pub fn cache_link_system(&self) -> CacheLinkSystem {
        CacheLinkSystem::new(Arc::clone(&self.cache))
    }

    /// Direct access to the datastore, without classification.
    pub fn vanilla_link_system(&self) -> VanillaLinkSystem {
        VanillaLinkSystem::new(Arc::clone(&self.datastore))
    }

    /// The chunk cache shared by every link system of this engine.
    pub fn cache(&self) -> &BoundedChunkCache {
        &self.cache
    }

    /// The datastore-backed mapping written by [`register_context`](Self::register_context).
    pub fn context_map(&self) -> &DatastoreContextMap {
        &self.context_map
    }

    /// Generate the chunk list for `context_id` into the cache and record
    /// its root so later cache misses can regenerate it. Publishers call
    /// this to learn the root link to put in an advertisement.
    pub fn generate_for_context(
        &self,
        ctx: &LinkContext,
        context_id: &ContextId,
    ) -> EngineResult<GeneratedChunks> {
        let out = self.main.generate_list(ctx, context_id)?;
        if let Some(head) = &out.head {
            self.context_map.put_mapping(context_id, head)?;
        }
        Ok(out)
    }

    /// Record that `root` heads the list for `context_id`.
    pub fn register_context(&self, context_id: &ContextId, root: &Cid) -> EngineResult<()> {
        self.context_map.put_mapping(context_id, root)
    }

    /// Forget the list for `context_id`. Returns its root, if one was mapped.
    pub fn remove_context(&self, context_id: &ContextId) -> EngineResult<Option<Cid>> {
        self.context_map.delete_mapping(context_id)
    }

    /// Drop every cached chunk. Returns the number removed.
    pub fn purge_link_cache(&self) -> usize {
        let removed = self.cache.purge();
        info!(removed, "purged link cache");
        removed
    }
}

/// Builder for [`Engine`]. The lister and any store overrides are fixed at
/// construction.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    datastore: Option<Arc<dyn Datastore>>,
    resolver: Option<Arc<dyn ContextResolver>>,
    lister: Option<Arc<dyn MultihashLister>>,
}

impl EngineBuilder {
    /// Replace the default configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this datastore instead of the one described by the config.
    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Resolve context ids with `resolver` instead of the datastore mapping.
    pub fn context_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The provider used to regenerate multihash lists on a cache miss.
    pub fn lister(mut self, lister: impl MultihashLister + 'static) -> Self {
        self.lister = Some(Arc::new(lister));
        self
    }

    /// Validate the configuration and open the stores.
    pub fn build(self) -> EngineResult<Engine> {
        let config = self.config;
        config.validate()?;

        let datastore: Arc<dyn Datastore> = match (self.datastore, &config.datastore_path) {
            (Some(datastore), _) => datastore,
            (None, Some(path)) => Arc::new(FsDatastore::open(path)?),
            (None, None) => Arc::new(InMemoryDatastore::new()),
        };
        let cache = Arc::new(BoundedChunkCache::new(config.cache_capacity));
        let context_map = DatastoreContextMap::new(Arc::clone(&datastore));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(context_map.clone()));

        info!(
            chunk_size = config.chunk_size,
            cache_capacity = config.cache_capacity,
            persistent = config.datastore_path.is_some(),
            lister = self.lister.is_some(),
            "engine initialised"
        );

        let main = MainLinkSystem::new(
            Arc::clone(&datastore),
            CacheLinkSystem::new(Arc::clone(&cache)),
            resolver,
            self.lister,
            config.chunk_size,
        );

        Ok(Engine {
            config,
            datastore,
            cache,
            context_map,
            main,
        })
    }
}
