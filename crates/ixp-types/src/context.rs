use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque handle supplied by an advertisement's owner.
///
/// The provider hands it back to the registered multihash lister to
/// regenerate the advertisement's multihash list. The system never
/// interprets its bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Vec<u8>);

impl ContextId {
    /// Wrap raw bytes as a context id.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw bytes, as handed to the lister and stored in the mapping.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the id, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Whether the id has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex-encoded form, used wherever the id must become part of a key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse the form produced by [`to_hex`](Self::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.to_hex())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Vec<u8>> for ContextId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ContextId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}
