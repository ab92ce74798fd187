//! Block-execution driver.
//!
//! - protocol messages ([`abci`]),
//! - the application answering them ([`app::HacApp`]),
//! - the per-block vote code ([`vote`]),
//! - read-only queries ([`query`]),
//! - a mempool and single-node engine for devnets ([`engine`]).

pub mod abci;
pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod mempool;
pub mod query;
pub mod vote;

pub use app::HacApp;
pub use config::ConsensusConfig;
pub use engine::{ConsensusEngine, ProducedBlock};
pub use error::AppError;
pub use mempool::{Mempool, TxPool};
pub use query::{Querier, QueryRouter};
