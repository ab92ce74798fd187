//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - the application (chain id, genesis validators, data home),
//! - storage (RocksDB path and creation flags),
//! - the agent oracle (service URL, agent id, timeout),
//! - metrics exporter (enable flag + listen address),
//! - block production (`ConsensusConfig`).
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes. [`ChainConfig::load`] reads TOML.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::ConsensusConfig;
use crate::consensus::abci::InitChainRequest;
use crate::metrics::MetricsRegistry;
use crate::oracle::{HttpOracle, Oracle, OracleError, StaticOracle};
use crate::storage::{MemBackend, RocksDbBackend, RocksDbConfig, StorageError, StoreBackend};
use crate::types::{PublicKey, ValidatorUpdate};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Genesis validator entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisValidator {
    #[serde(rename = "pubKey")]
    pub pub_key: PublicKey,
    pub power: i64,
}

/// Application settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base directory; relative storage paths resolve against it.
    pub home: PathBuf,
    pub chain_id: String,
    pub genesis: Vec<GenesisValidator>,
    /// Keep state in memory only. Everything is lost on restart.
    pub in_memory: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("."),
            chain_id: "hac-devnet".to_string(),
            genesis: Vec::new(),
            in_memory: false,
        }
    }
}

impl AppConfig {
    pub fn init_chain_request(&self) -> InitChainRequest {
        InitChainRequest {
            chain_id: self.chain_id.clone(),
            validators: self
                .genesis
                .iter()
                .map(|v| ValidatorUpdate {
                    pub_key: v.pub_key,
                    power: v.power,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    #[default]
    Http,
    /// Fixed answers from `static_approve`.
    Static,
}

/// Configuration for the agent oracle client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleClientConfig {
    pub kind: OracleKind,
    /// Base URL of the agent service, e.g. `"http://127.0.0.1:3000"`.
    pub base_url: String,
    /// Agent to address. Discovered from the service when unset.
    pub agent_id: Option<String>,
    pub timeout_ms: u64,
    pub static_approve: bool,
}

impl Default for OracleClientConfig {
    fn default() -> Self {
        Self {
            kind: OracleKind::Http,
            base_url: "http://127.0.0.1:3000".to_string(),
            agent_id: None,
            timeout_ms: 30_000,
            static_approve: true,
        }
    }
}

impl OracleClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn build(&self, metrics: Option<MetricsRegistry>) -> Result<Arc<dyn Oracle>, OracleError> {
        match self.kind {
            OracleKind::Static if self.static_approve => Ok(Arc::new(StaticOracle::approving())),
            OracleKind::Static => Ok(Arc::new(StaticOracle::rejecting())),
            OracleKind::Http => {
                let oracle = match &self.agent_id {
                    Some(id) => HttpOracle::new(self.base_url.clone(), id.clone(), self.timeout())?,
                    None => HttpOracle::discover(self.base_url.clone(), self.timeout())?,
                };
                let oracle = match metrics {
                    Some(m) => oracle.with_metrics(m),
                    None => oracle,
                };
                Ok(Arc::new(oracle))
            }
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9898),
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub app: AppConfig,
    pub storage: RocksDbConfig,
    pub oracle: OracleClientConfig,
    pub metrics: MetricsConfig,
    pub consensus: ConsensusConfig,
}

impl ChainConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Storage config with its path resolved against `app.home`.
    pub fn resolved_storage(&self) -> RocksDbConfig {
        let mut cfg = self.storage.clone();
        let path = Path::new(&cfg.path);
        if path.is_relative() {
            cfg.path = self.app.home.join(path).to_string_lossy().into_owned();
        }
        cfg
    }

    /// Opens the configured store backend.
    pub fn open_backend(&self) -> Result<Box<dyn StoreBackend>, StorageError> {
        if self.app.in_memory {
            return Ok(Box::new(MemBackend::new()));
        }
        Ok(Box::new(RocksDbBackend::open(&self.resolved_storage())?))
    }
}
