//! The external multihash provider seam.

use ixp_types::{ContextId, Multihash};

use crate::context::LinkContext;

/// Single-use, forward-only producer of multihashes. `None` ends the
/// sequence; an `Err` item aborts whatever is consuming it.
pub type MultihashIterator = Box<dyn Iterator<Item = anyhow::Result<Multihash>> + Send>;

/// Regenerates the multihash sequence for a context id.
///
/// Implemented for any matching closure, so a closure can be handed
/// straight to [`EngineBuilder::lister`](crate::EngineBuilder::lister).
pub trait MultihashLister: Send + Sync {
    fn list(&self, ctx: &LinkContext, context_id: &ContextId) -> anyhow::Result<MultihashIterator>;
}

impl<F> MultihashLister for F
where
    F: Fn(&LinkContext, &ContextId) -> anyhow::Result<MultihashIterator> + Send + Sync,
{
    fn list(&self, ctx: &LinkContext, context_id: &ContextId) -> anyhow::Result<MultihashIterator> {
        self(ctx, context_id)
    }
}

/// Iterator over an already materialized list.
pub fn iter_multihashes(multihashes: Vec<Multihash>) -> MultihashIterator {
    Box::new(multihashes.into_iter().map(Ok))
}
