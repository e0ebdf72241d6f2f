//! Configuration for the social layer and the notification indexer.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "index": { "poll_interval_ms": 5000, "path": "/var/lib/socialdrive/index" },
//!   "social": { "read_concurrency": 10 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub social: SocialConfig,
}

/// Notification indexer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Delay between index updates of the polling worker (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Directory of the on-disk index (sled backend)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            path: None,
        }
    }
}

impl IndexConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Social data layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Files read concurrently by `query_read`
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

fn default_read_concurrency() -> usize {
    10
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            read_concurrency: default_read_concurrency(),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.social.read_concurrency == 0 {
            return Err(Error::Config("social.read_concurrency must be > 0".into()));
        }
        if self.index.poll_interval_ms == 0 {
            return Err(Error::Config("index.poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}
