//! Foundation types for the ixp index provider.
//!
//! Every block this system reads or writes is addressed by a [`Cid`]. This
//! crate fixes how those identifiers are derived, how a generic node is
//! encoded and decoded without a concrete schema, and the shape of the
//! [`EntryChunk`] nodes that make up an advertisement's multihash list.
//!
//! # Key Types
//!
//! - [`Link`] / [`CidLink`] : anything that yields a content identifier
//! - [`ContextId`] : opaque handle used to regenerate a multihash list
//! - [`EntryChunk`] : bounded batch of multihashes linked to its predecessor
//! - [`Ipld`] : schema-less decoded node

pub mod context;
pub mod error;
pub mod link;
pub mod node;

pub use cid::Cid;
pub use ipld_core::ipld::Ipld;

pub use context::ContextId;
pub use error::{TypeError, TypeResult};
pub use link::{block_cid, sha256_multihash, CidLink, Link, Multihash, DAG_CBOR};
pub use node::{decode_node, encode_node, EntryChunk};
