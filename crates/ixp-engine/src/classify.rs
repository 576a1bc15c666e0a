//! Structural advertisement detection.
//!
//! Advertisements carry no type tag next to their bytes. A node is taken to
//! be an advertisement when it decodes to a map with a non-null top-level
//! `Signature` field. No other persisted schema may use that field name;
//! adding a persisted type with a `Signature` field requires revisiting this
//! check.

use ixp_types::{decode_node, Ipld};

use crate::error::EngineResult;

const SIGNATURE_FIELD: &str = "Signature";

/// What a persisted block turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Advertisement,
    Other,
}

/// Whether `node` is a map with a non-null top-level `Signature` field.
pub fn is_advertisement(node: &Ipld) -> bool {
    match node {
        Ipld::Map(map) => matches!(map.get(SIGNATURE_FIELD), Some(value) if *value != Ipld::Null),
        _ => false,
    }
}

/// Decode `bytes` generically and classify the result.
pub fn classify(bytes: &[u8]) -> EngineResult<NodeKind> {
    let node = decode_node(bytes)?;
    Ok(if is_advertisement(&node) {
        NodeKind::Advertisement
    } else {
        NodeKind::Other
    })
}
