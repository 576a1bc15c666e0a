//! Error types for link resolution and chunk generation.

use ixp_store::StoreError;
use ixp_types::{Cid, ContextId, TypeError};

/// Errors surfaced to callers of the link systems and the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No store holds a block for this CID.
    #[error("not found: {0}")]
    NotFound(Cid),

    /// The CID is not the root of any registered multihash list.
    #[error("no context id mapped to {0}")]
    NoContextMapping(Cid),

    /// Chunks must be generated but no multihash lister was configured.
    #[error("no multihash lister registered")]
    NoCallbackRegistered,

    /// Bytes were not a well-formed node.
    #[error("decode error: {0}")]
    Decode(String),

    /// A node could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The multihash lister could not produce an iterator.
    #[error("multihash lister failed: {0}")]
    Lister(#[source] anyhow::Error),

    /// The multihash iterator failed before end-of-sequence.
    #[error("multihash iterator failed: {0}")]
    Iterator(#[source] anyhow::Error),

    /// Datastore failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller's link context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Another request generating the same list failed.
    #[error("chunk generation for context {context} failed: {reason}")]
    GenerationFailed { context: ContextId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Whether this error means "absent" rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::NoContextMapping(_) | Self::Store(StoreError::NotFound(_))
        )
    }
}

impl From<TypeError> for EngineError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::Encode(reason) => Self::Encode(reason),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
