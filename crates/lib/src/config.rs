//! Configuration for local and relay-backed state.
//!
//! Every field has a default, so an empty JSON object (or a missing file) is
//! a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result, relay::APP_DATA_KIND};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`TreelikeConfig`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn is_read_error(&self) -> bool {
        matches!(self, ConfigError::Read { .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, ConfigError::Parse { .. })
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreelikeConfig {
    pub local: LocalStateConfig,
    pub relay: RelayConfig,
}

/// Settings for the persistent, broadcast-backed local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStateConfig {
    /// Root path of the local tree and name of its broadcast channel
    pub name: String,
    /// JSON file backing the persistent adapter
    pub storage_file: PathBuf,
}

impl Default for LocalStateConfig {
    fn default() -> Self {
        Self {
            name: "localState".to_string(),
            storage_file: PathBuf::from("treelike.json"),
        }
    }
}

/// Settings for the relay adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Event kind used for tree values
    pub kind: u16,
    /// Hex public keys whose values are read; empty reads every author
    pub authors: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            kind: APP_DATA_KIND,
            authors: Vec::new(),
        }
    }
}

impl TreelikeConfig {
    /// Loads configuration from a JSON file.
    ///
    /// If the file does not exist, the defaults are returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| -> Error {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            }
            .into()),
        }
    }
}
