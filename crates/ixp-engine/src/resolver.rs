//! Mapping between context ids and multihash list roots.
//!
//! When an advertisement referencing a multihash list is published, the
//! publisher records which context id produced the list's root CID. On a
//! later cache miss the main link system asks the [`ContextResolver`] for
//! that context id so the lister can regenerate the list.

use std::sync::Arc;

use ixp_store::Datastore;
use ixp_types::{Cid, ContextId};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

const CID_TO_CONTEXT_PREFIX: &str = "map/cidCtx/";
const CONTEXT_TO_CID_PREFIX: &str = "map/ctxCid/";

/// Looks up the context id whose multihash list has `cid` as its root.
pub trait ContextResolver: Send + Sync {
    fn context_id_for(&self, cid: &Cid) -> EngineResult<Option<ContextId>>;
}

/// Bidirectional context-id mapping kept in a datastore.
///
/// Durability follows the datastore: an in-memory store keeps the mapping
/// for the process lifetime, a filesystem store across restarts.
#[derive(Clone)]
pub struct DatastoreContextMap {
    store: Arc<dyn Datastore>,
}

impl DatastoreContextMap {
    /// Mapping stored in `store` under the `map/` key space.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    fn cid_key(cid: &Cid) -> String {
        format!("{CID_TO_CONTEXT_PREFIX}{cid}")
    }

    fn context_key(context_id: &ContextId) -> String {
        format!("{CONTEXT_TO_CID_PREFIX}{}", context_id.to_hex())
    }

    /// Record that `root` is the head of the list generated for `context_id`.
    /// A previous root for the same context is unmapped.
    pub fn put_mapping(&self, context_id: &ContextId, root: &Cid) -> EngineResult<()> {
        if let Some(old) = self.root_for(context_id)? {
            if old != *root {
                self.store.delete(&Self::cid_key(&old))?;
            }
        }
        self.store.put(&Self::cid_key(root), context_id.as_bytes())?;
        self.store.put(&Self::context_key(context_id), &root.to_bytes())?;
        debug!(context = %context_id, %root, "mapped context id to list root");
        Ok(())
    }

    /// Root CID of the list last recorded for `context_id`.
    pub fn root_for(&self, context_id: &ContextId) -> EngineResult<Option<Cid>> {
        match self.store.get(&Self::context_key(context_id))? {
            Some(bytes) => Cid::try_from(bytes.as_slice())
                .map(Some)
                .map_err(|e| EngineError::Decode(format!("stored root for {context_id}: {e}"))),
            None => Ok(None),
        }
    }

    /// Remove both directions of the mapping. Returns the root that was
    /// mapped, if any.
    pub fn delete_mapping(&self, context_id: &ContextId) -> EngineResult<Option<Cid>> {
        let root = self.root_for(context_id)?;
        if let Some(root) = &root {
            self.store.delete(&Self::cid_key(root))?;
        }
        self.store.delete(&Self::context_key(context_id))?;
        debug!(context = %context_id, root = ?root, "removed context id mapping");
        Ok(root)
    }
}

impl ContextResolver for DatastoreContextMap {
    fn context_id_for(&self, cid: &Cid) -> EngineResult<Option<ContextId>> {
        Ok(self.store.get(&Self::cid_key(cid))?.map(ContextId::from))
    }
}
