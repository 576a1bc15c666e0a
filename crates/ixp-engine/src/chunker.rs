//! Entry chunk generation.
//!
//! [`generate_chunks`] drains a multihash iterator into fixed-size batches
//! and writes each batch as an [`EntryChunk`] through the cache link system.
//! Every chunk links to the one written before it, so the last chunk written
//! is the head of the list and following `Next` links walks back to the
//! first chunk.
//!
//! The cache must hold an entire list at once. Whenever it is full before a
//! chunk is written its capacity doubles; once generation ends the capacity
//! shrinks back to the number of cached chunks (see
//! [`GenerationReservation`](ixp_store::GenerationReservation)).

use ixp_store::GenerationReservation;
use ixp_types::{Cid, EntryChunk, Multihash};
use tracing::{debug, info, warn};

use crate::context::LinkContext;
use crate::error::{EngineError, EngineResult};
use crate::linksys::{CacheLinkSystem, LinkSystem};
use crate::lister::MultihashIterator;

/// Outcome of one generation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratedChunks {
    /// CID of the last chunk written; `None` for an empty sequence.
    pub head: Option<Cid>,
    pub chunk_count: usize,
    pub multihash_count: usize,
    /// Largest cache capacity reached while generating.
    pub peak_capacity: usize,
}

/// Drain `iter` into a backward-linked list of chunks of at most
/// `chunk_size` multihashes, written through `lsys`.
///
/// Iterator, encoding and cancellation failures abort at once. Chunks
/// written before the failure stay cached but are unreachable from any
/// returned head and age out of the cache.
pub fn generate_chunks(
    ctx: &LinkContext,
    mut iter: MultihashIterator,
    chunk_size: usize,
    lsys: &CacheLinkSystem,
) -> EngineResult<GeneratedChunks> {
    if chunk_size == 0 {
        return Err(EngineError::InvalidConfig("chunk_size must be positive".into()));
    }

    let mut run = ChunkRun {
        ctx,
        lsys,
        reservation: lsys.cache().begin_generation(),
        chunk_size,
        batch: Vec::with_capacity(chunk_size),
        previous: None,
        chunk_count: 0,
        multihash_count: 0,
        peak_capacity: lsys.cache().cap(),
    };

    if let Err(e) = run.consume(&mut iter) {
        if run.chunk_count > 0 {
            warn!(
                orphaned = run.chunk_count,
                error = %e,
                "generation aborted, already written chunks are unreachable"
            );
        }
        return Err(e);
    }

    let out = GeneratedChunks {
        head: run.previous,
        chunk_count: run.chunk_count,
        multihash_count: run.multihash_count,
        peak_capacity: run.peak_capacity,
    };
    let grew_cache = run.reservation.grew();
    if let Some(cap) = run.reservation.release() {
        debug!(cap, "chunk cache capacity reclaimed");
    }

    info!(
        multihash_count = out.multihash_count,
        chunk_count = out.chunk_count,
        head = ?out.head,
        grew_cache,
        "generated linked chunks of multihashes"
    );
    Ok(out)
}

struct ChunkRun<'a> {
    ctx: &'a LinkContext,
    lsys: &'a CacheLinkSystem,
    reservation: GenerationReservation<'a>,
    chunk_size: usize,
    batch: Vec<Multihash>,
    previous: Option<Cid>,
    chunk_count: usize,
    multihash_count: usize,
    peak_capacity: usize,
}

impl ChunkRun<'_> {
    fn consume(&mut self, iter: &mut MultihashIterator) -> EngineResult<()> {
        loop {
            self.ctx.check()?;
            let Some(next) = iter.next() else {
                break;
            };
            self.batch.push(next.map_err(EngineError::Iterator)?);
            self.multihash_count += 1;
            if self.batch.len() >= self.chunk_size {
                self.flush()?;
            }
        }
        if !self.batch.is_empty() {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the current batch as a chunk linked to the previous one.
    fn flush(&mut self) -> EngineResult<()> {
        if let Some(cap) = self.reservation.grow_if_full() {
            self.peak_capacity = self.peak_capacity.max(cap);
        }
        let entries = std::mem::replace(&mut self.batch, Vec::with_capacity(self.chunk_size));
        let bytes = EntryChunk::new(entries, self.previous).encode()?;
        let mut writer = self.lsys.write(self.ctx);
        writer.stage(&bytes);
        let cid = writer.commit()?;
        debug!(%cid, index = self.chunk_count, "wrote entry chunk");
        self.previous = Some(cid);
        self.chunk_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lister::iter_multihashes;
    use ixp_store::BoundedChunkCache;
    use ixp_types::sha256_multihash;

    fn mhs(n: usize) -> Vec<Multihash> {
        (0..n)
            .map(|i| sha256_multihash(format!("mh-{i}").as_bytes()))
            .collect()
    }

    fn cache_lsys(cap: usize) -> CacheLinkSystem {
        CacheLinkSystem::new(Arc::new(BoundedChunkCache::new(cap)))
    }

    /// Chunk sizes walking from the head to the first chunk written.
    fn walk(lsys: &CacheLinkSystem, head: Option<Cid>) -> Vec<usize> {
        let ctx = LinkContext::new();
        let mut sizes = Vec::new();
        let mut next = head;
        while let Some(cid) = next {
            let chunk = EntryChunk::decode(&lsys.read(&ctx, &cid).unwrap()).unwrap();
            sizes.push(chunk.len());
            next = chunk.next;
        }
        sizes
    }

    #[test]
    fn five_multihashes_in_chunks_of_two() {
        let lsys = cache_lsys(16);
        let out = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(5)), 2, &lsys).unwrap();
        assert_eq!(out.chunk_count, 3);
        assert_eq!(out.multihash_count, 5);
        // Head holds the remainder; write order was [2, 2, 1].
        assert_eq!(walk(&lsys, out.head), vec![1, 2, 2]);
    }

    #[test]
    fn entries_keep_iteration_order() {
        let lsys = cache_lsys(16);
        let input = mhs(5);
        let out = generate_chunks(&LinkContext::new(), iter_multihashes(input.clone()), 2, &lsys)
            .unwrap();
        let ctx = LinkContext::new();
        let mut chunks = Vec::new();
        let mut next = out.head;
        while let Some(cid) = next {
            let chunk = EntryChunk::decode(&lsys.read(&ctx, &cid).unwrap()).unwrap();
            next = chunk.next;
            chunks.push(chunk.entries);
        }
        chunks.reverse();
        assert_eq!(chunks.concat(), input);
    }

    #[test]
    fn empty_sequence_has_no_head() {
        let lsys = cache_lsys(4);
        let out = generate_chunks(&LinkContext::new(), iter_multihashes(vec![]), 3, &lsys).unwrap();
        assert_eq!(out.head, None);
        assert_eq!(out.chunk_count, 0);
        assert!(lsys.cache().is_empty());
    }

    #[test]
    fn same_input_same_head() {
        let a = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(7)), 3, &cache_lsys(8))
            .unwrap();
        let b = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(7)), 3, &cache_lsys(8))
            .unwrap();
        assert!(a.head.is_some());
        assert_eq!(a.head, b.head);
    }

    #[test]
    fn cache_doubles_then_shrinks_to_fit() {
        let lsys = cache_lsys(2);
        let out = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(5)), 1, &lsys).unwrap();
        assert_eq!(out.chunk_count, 5);
        // 2 -> 4 -> 8, then shrink to the five chunks held.
        assert_eq!(out.peak_capacity, 8);
        assert_eq!(lsys.cache().cap(), 5);
        assert_eq!(lsys.cache().len(), 5);
        assert_eq!(walk(&lsys, out.head).len(), 5);
    }

    #[test]
    fn roomy_cache_is_not_resized() {
        let lsys = cache_lsys(64);
        let out = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(9)), 2, &lsys).unwrap();
        assert_eq!(out.peak_capacity, 64);
        assert_eq!(lsys.cache().cap(), 64);
    }

    #[test]
    fn iterator_failure_aborts_generation() {
        let lsys = cache_lsys(8);
        let items: Vec<anyhow::Result<Multihash>> = mhs(3)
            .into_iter()
            .map(Ok)
            .chain(std::iter::once(Err(anyhow::anyhow!("disk went away"))))
            .collect();
        let err = generate_chunks(&LinkContext::new(), Box::new(items.into_iter()), 2, &lsys)
            .unwrap_err();
        assert!(matches!(err, EngineError::Iterator(_)));
        // The first full chunk was committed before the failure.
        assert_eq!(lsys.cache().len(), 1);
    }

    #[test]
    fn cancelled_context_aborts_generation() {
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = LinkContext::with_cancellation(token);
        let lsys = cache_lsys(8);
        let err = generate_chunks(&ctx, iter_multihashes(mhs(4)), 2, &lsys).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(lsys.cache().is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(1)), 0, &cache_lsys(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// n multihashes in chunks of k give ceil(n/k) chunks, all full
            /// except a head holding n mod k.
            #[test]
            fn chunk_sizing(n in 0usize..60, k in 1usize..9) {
                let lsys = cache_lsys(1);
                let out = generate_chunks(&LinkContext::new(), iter_multihashes(mhs(n)), k, &lsys)
                    .unwrap();
                prop_assert_eq!(out.chunk_count, n.div_ceil(k));
                let sizes = walk(&lsys, out.head);
                prop_assert_eq!(sizes.len(), out.chunk_count);
                if let Some((head, rest)) = sizes.split_first() {
                    let expected_head = if n % k == 0 { k } else { n % k };
                    prop_assert_eq!(*head, expected_head);
                    prop_assert!(rest.iter().all(|&s| s == k));
                }
                prop_assert!(lsys.cache().len() <= lsys.cache().cap());
            }
        }
    }
}
