//! Generic node codec and the entry chunk schema.
//!
//! Nodes are dag-cbor. [`decode_node`] produces a schema-less [`Ipld`] tree
//! so callers can inspect fields by name without knowing which concrete
//! schema produced the bytes.

use std::collections::BTreeMap;

use cid::Cid;
use ipld_core::ipld::Ipld;

use crate::error::{TypeError, TypeResult};
use crate::link::Multihash;

const ENTRIES_FIELD: &str = "Entries";
const NEXT_FIELD: &str = "Next";

/// Decode dag-cbor bytes into a generic node.
pub fn decode_node(bytes: &[u8]) -> TypeResult<Ipld> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| TypeError::Decode(e.to_string()))
}

/// Encode a generic node as dag-cbor.
pub fn encode_node(node: &Ipld) -> TypeResult<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(node).map_err(|e| TypeError::Encode(e.to_string()))
}

/// One segment of an advertisement's multihash list.
///
/// `next` links to the chunk written before this one; the first chunk of a
/// list has none. Walking `next` from the head therefore visits chunks in
/// reverse write order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryChunk {
    pub entries: Vec<Multihash>,
    pub next: Option<Cid>,
}

impl EntryChunk {
    /// A chunk holding `entries` and linking to `next`.
    pub fn new(entries: Vec<Multihash>, next: Option<Cid>) -> Self {
        Self { entries, next }
    }

    /// Number of multihashes in this chunk.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The generic node form: `Entries` as a list of multihash bytes and
    /// `Next` as a link, or null for the first chunk of a list.
    pub fn to_ipld(&self) -> Ipld {
        let entries = self
            .entries
            .iter()
            .map(|mh| Ipld::Bytes(mh.to_bytes()))
            .collect();
        let next = match self.next {
            Some(cid) => Ipld::Link(cid),
            None => Ipld::Null,
        };
        let mut map = BTreeMap::new();
        map.insert(ENTRIES_FIELD.to_string(), Ipld::List(entries));
        map.insert(NEXT_FIELD.to_string(), next);
        Ipld::Map(map)
    }

    /// Read a chunk back from its generic node form. Anything not shaped
    /// like [`to_ipld`](Self::to_ipld) output is a [`TypeError::Schema`].
    pub fn from_ipld(node: &Ipld) -> TypeResult<Self> {
        let Ipld::Map(map) = node else {
            return Err(TypeError::Schema("entry chunk is not a map".into()));
        };
        let Some(Ipld::List(raw)) = map.get(ENTRIES_FIELD) else {
            return Err(TypeError::Schema(format!(
                "missing or malformed {ENTRIES_FIELD} list"
            )));
        };
        let entries = raw
            .iter()
            .map(|item| match item {
                Ipld::Bytes(bytes) => Multihash::from_bytes(bytes)
                    .map_err(|e| TypeError::InvalidMultihash(e.to_string())),
                _ => Err(TypeError::Schema("entry is not bytes".into())),
            })
            .collect::<TypeResult<Vec<_>>>()?;
        let next = match map.get(NEXT_FIELD) {
            None | Some(Ipld::Null) => None,
            Some(Ipld::Link(cid)) => Some(*cid),
            Some(_) => return Err(TypeError::Schema(format!("{NEXT_FIELD} is not a link"))),
        };
        Ok(Self { entries, next })
    }

    /// Serialize to dag-cbor block bytes.
    pub fn encode(&self) -> TypeResult<Vec<u8>> {
        encode_node(&self.to_ipld())
    }

    /// Parse dag-cbor block bytes as a chunk.
    pub fn decode(bytes: &[u8]) -> TypeResult<Self> {
        Self::from_ipld(&decode_node(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{block_cid, sha256_multihash};

    fn mhs(n: usize) -> Vec<Multihash> {
        (0..n)
            .map(|i| sha256_multihash(format!("content-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn first_chunk_has_null_next() {
        let chunk = EntryChunk::new(mhs(3), None);
        let node = chunk.to_ipld();
        let Ipld::Map(map) = &node else {
            panic!("expected map");
        };
        assert_eq!(map.get("Next"), Some(&Ipld::Null));
        assert_eq!(EntryChunk::from_ipld(&node).unwrap(), chunk);
    }

    #[test]
    fn linked_chunk_decodes_from_bytes() {
        let prev = block_cid(b"previous chunk");
        let chunk = EntryChunk::new(mhs(2), Some(prev));
        let bytes = chunk.encode().unwrap();
        let decoded = EntryChunk::decode(&bytes).unwrap();
        assert_eq!(decoded.next, Some(prev));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn identical_chunks_encode_identically() {
        let a = EntryChunk::new(mhs(4), None).encode().unwrap();
        let b = EntryChunk::new(mhs(4), None).encode().unwrap();
        assert_eq!(block_cid(&a), block_cid(&b));
    }

    #[test]
    fn generic_decode_sees_named_fields() {
        let bytes = EntryChunk::new(mhs(1), None).encode().unwrap();
        let Ipld::Map(map) = decode_node(&bytes).unwrap() else {
            panic!("expected map");
        };
        assert!(map.contains_key("Entries"));
        assert!(!map.contains_key("Signature"));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_node(&[0xff, 0x00, 0x13]),
            Err(TypeError::Decode(_))
        ));
    }

    #[test]
    fn non_map_is_schema_error() {
        let err = EntryChunk::from_ipld(&Ipld::Integer(7)).unwrap_err();
        assert!(matches!(err, TypeError::Schema(_)));
    }

    #[test]
    fn non_bytes_entry_is_schema_error() {
        let mut map = BTreeMap::new();
        map.insert("Entries".to_string(), Ipld::List(vec![Ipld::String("x".into())]));
        map.insert("Next".to_string(), Ipld::Null);
        let err = EntryChunk::from_ipld(&Ipld::Map(map)).unwrap_err();
        assert!(matches!(err, TypeError::Schema(_)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Decoding an encoded chunk yields the same entries and link.
            #[test]
            fn encode_decode_preserves_chunk(
                seeds in prop::collection::vec(any::<u64>(), 0..32),
                linked in any::<bool>(),
            ) {
                let entries: Vec<Multihash> = seeds
                    .iter()
                    .map(|s| sha256_multihash(&s.to_le_bytes()))
                    .collect();
                let next = linked.then(|| block_cid(b"prev"));
                let chunk = EntryChunk::new(entries, next);
                let bytes = chunk.encode().unwrap();
                prop_assert_eq!(EntryChunk::decode(&bytes).unwrap(), chunk);
            }
        }
    }
}
