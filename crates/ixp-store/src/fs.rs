//! Filesystem-backed datastore.
//!
//! Each key maps to one file under the root directory. File names are the
//! hex encoding of the key, so keys may contain `/` and other characters
//! that are not valid in paths. A key whose hex form would exceed
//! [`MAX_HEX_NAME`] is stored under `sha256-<hex digest of the key>`
//! instead; the prefix is not hex, so the two name spaces never collide.
//!
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so a reader never observes a partially written value.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ixp_types::sha256_multihash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Datastore;

/// Longest file name written verbatim as hex, well under the common
/// 255-byte file name limit.
pub const MAX_HEX_NAME: usize = 200;

const HASHED_NAME_PREFIX: &str = "sha256-";

/// Datastore keeping one file per key under `root`.
#[derive(Debug)]
pub struct FsDatastore {
    root: PathBuf,
}

impl FsDatastore {
    /// Open (or create) a datastore rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened filesystem datastore");
        Ok(Self { root })
    }

    /// Directory holding the value files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "empty key".into(),
            });
        }
        Ok(self.root.join(file_name(key)))
    }
}

/// File name for `key`: plain hex, or a digest for long keys.
fn file_name(key: &str) -> String {
    if key.len() * 2 <= MAX_HEX_NAME {
        hex::encode(key.as_bytes())
    } else {
        let digest = sha256_multihash(key.as_bytes());
        format!("{HASHED_NAME_PREFIX}{}", hex::encode(digest.digest()))
    }
}

impl Datastore for FsDatastore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
