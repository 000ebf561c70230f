//! Server configuration.
//!
//! Read from the JSON file named by `CHUNKUP_CONFIG`, or
//! `./chunkup-server.json`. Every field is optional; a missing file means
//! all defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkup_protocol::DEFAULT_PORT;
use chunkup_store::{DEFAULT_MERGE_CONCURRENCY, StoreConfig};
use serde::{Deserialize, Serialize};

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "CHUNKUP_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "chunkup-server.json";

/// Room for multipart headers and the text fields around a chunk.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub upload_dir: PathBuf,
    pub merge_concurrency: usize,
    /// Largest chunk accepted, in bytes.
    pub max_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            upload_dir: PathBuf::from("upload"),
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
            max_chunk_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Loads the config from `CHUNKUP_CONFIG` or the default file name.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Loads the config at `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            root: self.upload_dir.clone(),
            merge_concurrency: self.merge_concurrency.max(1),
        }
    }

    /// Request body limit for chunk uploads.
    pub fn body_limit(&self) -> usize {
        self.max_chunk_bytes.saturating_add(MULTIPART_OVERHEAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind.port(), 3001);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"uploadDir":"/srv/uploads","mergeConcurrency":8}"#).unwrap();

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.merge_concurrency, 8);
        assert_eq!(config.max_chunk_bytes, 16 * 1024 * 1024);
        assert_eq!(config.bind, ServerConfig::default().bind);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ServerConfig::load_from(&path).is_err());
    }

    #[test]
    fn zero_merge_concurrency_is_raised() {
        let config = ServerConfig {
            merge_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.store_config().merge_concurrency, 1);
    }
}
