//! Shared application state.

use std::sync::Arc;

use hac_chain::ConsensusEngine;

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor.
pub struct AppState {
    /// Embedded engine; owns the application and its mempool.
    pub engine: Arc<ConsensusEngine>,
    pub chain_id: String,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
