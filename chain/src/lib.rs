//! Chain library crate.
//!
//! Deterministic state-transition core of the HAC governance chain:
//!
//! - strongly-typed domain types and the transaction codec (`types`),
//! - the Merkle-committed versioned store and its backends (`storage`),
//! - ledger state, its overlay and the validator selector (`state`),
//! - per-type transaction handlers (`handler`),
//! - the block-execution driver and devnet engine (`consensus`),
//! - the agent oracle clients (`oracle`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).

pub mod config;
pub mod consensus;
pub mod handler;
pub mod metrics;
pub mod oracle;
pub mod state;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{
    AppConfig, ChainConfig, ConfigError, GenesisValidator, MetricsConfig, OracleClientConfig,
    OracleKind,
};

// Re-export the driver.
pub use consensus::{
    AppError, ConsensusConfig, ConsensusEngine, HacApp, Mempool, ProducedBlock, TxPool,
};

pub use handler::{TxHandler, TxHandlers};
pub use oracle::{HttpOracle, Oracle, OracleError, StaticOracle};
pub use state::{State, StateDB, StateError, StateHeader};
pub use storage::{MemBackend, MerkleStore, RocksDbBackend, RocksDbConfig, StorageError, StoreBackend};

// Re-export metrics registry and application metrics.
pub use metrics::{AppMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;
