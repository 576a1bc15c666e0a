use std::fmt;
use std::str::FromStr;

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use crate::error::TypeError;

/// Multicodec code for dag-cbor, the codec of every block this system writes.
pub const DAG_CBOR: u64 = 0x71;

/// A multihash with the default 64-byte digest allocation.
pub type Multihash = cid::multihash::Multihash<64>;

/// SHA2-256 multihash of raw bytes.
pub fn sha256_multihash(data: &[u8]) -> Multihash {
    Code::Sha2_256.digest(data)
}

/// The CID of a dag-cbor block with the given bytes.
///
/// Identical bytes always produce the same CID, which is what makes every
/// store in this system content-addressed.
pub fn block_cid(data: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR, sha256_multihash(data))
}

/// Anything that yields a content identifier.
///
/// Resolution logic only ever needs the CID behind a link, so link systems
/// accept `&dyn Link` and stay independent of how a link is represented.
pub trait Link {
    fn cid(&self) -> Cid;
}

impl Link for Cid {
    fn cid(&self) -> Cid {
        *self
    }
}

/// The concrete link variant: a plain CID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CidLink(Cid);

impl CidLink {
    /// Wrap an existing CID.
    pub fn new(cid: Cid) -> Self {
        Self(cid)
    }

    /// Link to the dag-cbor block with the given bytes.
    pub fn from_block(data: &[u8]) -> Self {
        Self(block_cid(data))
    }

    /// Short hex of the digest (first 8 characters).
    fn short_hex(&self) -> String {
        let digest = self.0.hash().digest();
        hex::encode(&digest[..digest.len().min(4)])
    }
}

impl Link for CidLink {
    fn cid(&self) -> Cid {
        self.0
    }
}

impl fmt::Debug for CidLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CidLink({})", self.short_hex())
    }
}

impl fmt::Display for CidLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Cid> for CidLink {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

impl From<CidLink> for Cid {
    fn from(link: CidLink) -> Self {
        link.0
    }
}

impl FromStr for CidLink {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::try_from(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidCid(e.to_string()))
    }
}
