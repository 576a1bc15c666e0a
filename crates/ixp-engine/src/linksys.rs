//! Link systems: read/write policies mapping CIDs to bytes.
//!
//! - [`VanillaLinkSystem`] reads and writes the datastore directly.
//! - [`CacheLinkSystem`] reads and writes the chunk cache directly.
//! - [`MainLinkSystem`] is the resolution entry point. It serves persisted
//!   blocks from the datastore and entry chunks from the cache, generating
//!   the chunks of a multihash list on first request.
//!
//! Writes never take a key from the caller. A [`BlockWriter`] stages bytes
//! and [`BlockWriter::commit`] derives the CID from them.

use std::io;
use std::sync::Arc;

use ixp_store::{BoundedChunkCache, Datastore};
use ixp_types::{block_cid, decode_node, encode_node, Cid, ContextId, Ipld, Link};
use tracing::{debug, error, info};

use crate::chunker::{generate_chunks, GeneratedChunks};
use crate::classify::{classify, NodeKind};
use crate::context::LinkContext;
use crate::error::{EngineError, EngineResult};
use crate::flight::SingleFlight;
use crate::lister::MultihashLister;
use crate::resolver::ContextResolver;

type Committer<'a> = Box<dyn FnOnce(&Cid, Vec<u8>) -> EngineResult<()> + Send + 'a>;

/// Sink for one block. Nothing is persisted until [`commit`](Self::commit).
pub struct BlockWriter<'a> {
    buf: Vec<u8>,
    committer: Committer<'a>,
}

impl<'a> BlockWriter<'a> {
    /// A writer handing the staged bytes and their CID to `committer`.
    pub fn new(committer: impl FnOnce(&Cid, Vec<u8>) -> EngineResult<()> + Send + 'a) -> Self {
        Self {
            buf: Vec::new(),
            committer: Box::new(committer),
        }
    }

    /// Append bytes to the block.
    pub fn stage(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes staged so far.
    pub fn staged(&self) -> &[u8] {
        &self.buf
    }

    /// Persist the staged bytes under their CID and return it.
    pub fn commit(self) -> EngineResult<Cid> {
        let cid = block_cid(&self.buf);
        (self.committer)(&cid, self.buf)?;
        Ok(cid)
    }
}

impl io::Write for BlockWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stage(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read/write policy over one CID namespace.
pub trait LinkSystem: Send + Sync {
    /// Bytes of the block behind `link`.
    fn read(&self, ctx: &LinkContext, link: &dyn Link) -> EngineResult<Vec<u8>>;

    /// Open a writer whose commit persists into this link system's store.
    fn write(&self, ctx: &LinkContext) -> BlockWriter<'_>;

    /// Encode `node` and write it, returning its CID.
    fn store_node(&self, ctx: &LinkContext, node: &Ipld) -> EngineResult<Cid> {
        let bytes = encode_node(node)?;
        let mut writer = self.write(ctx);
        writer.stage(&bytes);
        writer.commit()
    }

    /// Read the block behind `link` and decode it generically.
    fn load_node(&self, ctx: &LinkContext, link: &dyn Link) -> EngineResult<Ipld> {
        Ok(decode_node(&self.read(ctx, link)?)?)
    }
}

fn datastore_key(cid: &Cid) -> String {
    cid.to_string()
}

fn datastore_writer<'a>(datastore: &'a dyn Datastore, ctx: &LinkContext) -> BlockWriter<'a> {
    let ctx = ctx.clone();
    BlockWriter::new(move |cid, bytes| {
        ctx.check()?;
        datastore.put(&datastore_key(cid), &bytes)?;
        debug!(%cid, size = bytes.len(), "stored block in datastore");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Vanilla
// ---------------------------------------------------------------------------

/// Plain loads and stores against the datastore.
///
/// Used when the caller already knows a CID names a persisted object, such
/// as a link found inside an advertisement, and must not re-enter the
/// classification and generation logic.
#[derive(Clone)]
pub struct VanillaLinkSystem {
    datastore: Arc<dyn Datastore>,
}

impl VanillaLinkSystem {
    /// Link system over `datastore`.
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

impl LinkSystem for VanillaLinkSystem {
    fn read(&self, ctx: &LinkContext, link: &dyn Link) -> EngineResult<Vec<u8>> {
        ctx.check()?;
        let cid = link.cid();
        self.datastore
            .get(&datastore_key(&cid))?
            .ok_or(EngineError::NotFound(cid))
    }

    fn write(&self, ctx: &LinkContext) -> BlockWriter<'_> {
        datastore_writer(self.datastore.as_ref(), ctx)
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Loads and stores against the bounded chunk cache. A miss is `NotFound`.
#[derive(Clone)]
pub struct CacheLinkSystem {
    cache: Arc<BoundedChunkCache>,
}

impl CacheLinkSystem {
    /// Link system over `cache`.
    pub fn new(cache: Arc<BoundedChunkCache>) -> Self {
        Self { cache }
    }

    /// The underlying cache, for capacity bookkeeping.
    pub fn cache(&self) -> &BoundedChunkCache {
        &self.cache
    }
}

impl LinkSystem for CacheLinkSystem {
    fn read(&self, ctx: &LinkContext, link: &dyn Link) -> EngineResult<Vec<u8>> {
        ctx.check()?;
        let cid = link.cid();
        self.cache.get(&cid).ok_or_else(|| {
            debug!(%cid, "no cache entry");
            EngineError::NotFound(cid)
        })
    }

    fn write(&self, ctx: &LinkContext) -> BlockWriter<'_> {
        let ctx = ctx.clone();
        BlockWriter::new(move |cid, bytes| {
            ctx.check()?;
            self.cache.put(*cid, bytes);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// The resolution entry point used by the publish and announce paths.
///
/// Reads consult the datastore first. Anything persisted there is returned
/// as is (advertisements and plain objects alike). Any other CID is treated
/// as an entry chunk: served from the cache, or generated into it by
/// re-running the multihash lister for the list's context id.
#[derive(Clone)]
pub struct MainLinkSystem {
    datastore: Arc<dyn Datastore>,
    cache: CacheLinkSystem,
    resolver: Arc<dyn ContextResolver>,
    lister: Option<Arc<dyn MultihashLister>>,
    chunk_size: usize,
    flights: Arc<SingleFlight<Generation>>,
}

/// Outcome shared by the requests of one generation flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Generation {
    Ran(GeneratedChunks),
    /// The wanted chunk was cached before the leader started, so nothing ran.
    AlreadyCached,
}

impl MainLinkSystem {
    /// Clones share the single-flight table, so concurrent requests through
    /// any clone are de-duplicated together.
    pub fn new(
        datastore: Arc<dyn Datastore>,
        cache: CacheLinkSystem,
        resolver: Arc<dyn ContextResolver>,
        lister: Option<Arc<dyn MultihashLister>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            datastore,
            cache,
            resolver,
            lister,
            chunk_size,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    /// Generate the whole chunk list for `context_id` and report its head.
    ///
    /// Joining a flight that skipped generation because its own chunk was
    /// already cached says nothing about the head, so in that case this
    /// request runs again and leads.
    pub(crate) fn generate_list(
        &self,
        ctx: &LinkContext,
        context_id: &ContextId,
    ) -> EngineResult<GeneratedChunks> {
        loop {
            match self.generate(ctx, context_id, None)? {
                Generation::Ran(out) => return Ok(out),
                Generation::AlreadyCached => {
                    debug!(context = %context_id, "joined a skipped generation, running again");
                }
            }
        }
    }

    /// Generate the chunk list for `context_id`, sharing the work with any
    /// concurrent request for the same context. When `wanted` is already
    /// cached by the time this request leads the flight, generation is
    /// skipped.
    fn generate(
        &self,
        ctx: &LinkContext,
        context_id: &ContextId,
        wanted: Option<&Cid>,
    ) -> EngineResult<Generation> {
        let lister = self.lister.as_ref().ok_or_else(|| {
            error!("no multihash lister has been registered");
            EngineError::NoCallbackRegistered
        })?;
        self.flights.run(ctx, context_id, || {
            if let Some(cid) = wanted {
                if self.cache.cache().contains(cid) {
                    debug!(%cid, "chunk cached by an earlier generation, skipping");
                    return Ok(Generation::AlreadyCached);
                }
            }
            ctx.check()?;
            let iter = lister.list(ctx, context_id).map_err(EngineError::Lister)?;
            generate_chunks(ctx, iter, self.chunk_size, &self.cache).map(Generation::Ran)
        })
    }
}

impl LinkSystem for MainLinkSystem {
    fn read(&self, ctx: &LinkContext, link: &dyn Link) -> EngineResult<Vec<u8>> {
        ctx.check()?;
        let cid = link.cid();
        debug!(%cid, "resolving link");

        if let Some(bytes) = self.datastore.get(&datastore_key(&cid))? {
            match classify(&bytes) {
                Ok(NodeKind::Advertisement) => {
                    info!(%cid, size = bytes.len(), "retrieved advertisement from datastore");
                }
                Ok(NodeKind::Other) => {
                    info!(
                        %cid,
                        size = bytes.len(),
                        "retrieved non-advertisement object from datastore"
                    );
                }
                Err(e) => {
                    error!(%cid, error = %e, "could not decode node for potential advertisement");
                    return Err(e);
                }
            }
            return Ok(bytes);
        }

        if self.lister.is_none() {
            error!("no multihash lister has been registered");
            return Err(EngineError::NoCallbackRegistered);
        }

        if let Some(bytes) = self.cache.cache().get(&cid) {
            debug!(%cid, "found cache entry");
            return Ok(bytes);
        }

        info!(%cid, "entry not cached, generating chunks");
        let context_id = self.resolver.context_id_for(&cid)?.ok_or_else(|| {
            error!(%cid, "no context id mapped to link");
            EngineError::NoContextMapping(cid)
        })?;
        if let Err(e) = self.generate(ctx, &context_id, Some(&cid)) {
            error!(
                %cid,
                context = %context_id,
                error = %e,
                "error generating linked list from lister"
            );
            return Err(e);
        }

        self.cache.cache().get(&cid).ok_or_else(|| {
            error!(%cid, "no object found in any store after generation");
            EngineError::NotFound(cid)
        })
    }

    fn write(&self, ctx: &LinkContext) -> BlockWriter<'_> {
        datastore_writer(self.datastore.as_ref(), ctx)
    }
}
