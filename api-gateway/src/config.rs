//! API gateway configuration.
//!
//! The HTTP listen address and the path of the chain configuration file
//! come from the environment:
//!
//! - `HAC_API_ADDR`: listen address, default `0.0.0.0:8081`,
//! - `HAC_CONFIG`: TOML file for [`hac_chain::ChainConfig`]; defaults are
//!   used when unset.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Configuration for the API gateway HTTP server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,
    pub chain_config: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        // All interfaces, so a container port mapping reaches it.
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8081),
            chain_config: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Ok(addr) = std::env::var("HAC_API_ADDR") {
            cfg.listen_addr = addr
                .parse()
                .map_err(|e| format!("invalid HAC_API_ADDR {addr:?}: {e}"))?;
        }
        cfg.chain_config = std::env::var_os("HAC_CONFIG").map(PathBuf::from);
        Ok(cfg)
    }
}
