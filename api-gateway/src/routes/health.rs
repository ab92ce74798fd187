use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::SharedState;

/// Liveness plus the committed chain tip.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub chain_id: String,
    pub height: u64,
    pub app_hash: String,
    pub pending_txs: usize,
}

/// `GET /health`
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let info = state.engine.app().info();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            chain_id: state.chain_id.clone(),
            height: info.last_block_height,
            app_hash: info.last_block_app_hash.to_string(),
            pending_txs: state.engine.pending(),
        }),
    )
}
