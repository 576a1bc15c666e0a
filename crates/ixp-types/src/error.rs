/// Errors from identifier parsing and node encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The input could not be parsed as a CID.
    #[error("invalid cid: {0}")]
    InvalidCid(String),

    /// The input could not be parsed as a multihash.
    #[error("invalid multihash: {0}")]
    InvalidMultihash(String),

    /// Bytes were not a well-formed dag-cbor node.
    #[error("decode error: {0}")]
    Decode(String),

    /// A node could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The node decoded but does not have the expected shape.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
