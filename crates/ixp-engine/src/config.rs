use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for the resolution engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of multihashes per entry chunk.
    pub chunk_size: usize,
    /// Initial capacity of the chunk cache, in chunks.
    pub cache_capacity: usize,
    /// Directory of the filesystem datastore. `None` keeps advertisements
    /// and the context-id mapping in memory for the process lifetime.
    pub datastore_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            cache_capacity: 1024,
            datastore_path: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes that would make generation or caching impossible.
    pub fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.cache_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "cache_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
