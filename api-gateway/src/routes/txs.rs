use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use hac_chain::Hash256;

use crate::state::SharedState;

/// Hex form of a `POST /txs` body: `{"tx": "<hex of the wire bytes>"}`.
#[derive(Debug, Deserialize)]
struct HexTx {
    tx: String,
}

/// Wire bytes carried by a `POST /txs` body.
///
/// The body is either the hex form or the signed JSON envelope itself.
/// An envelope is forwarded byte for byte, so the returned hash is the
/// one the mempool keys it by.
fn submitted_bytes(body: &[u8]) -> Result<Vec<u8>, String> {
    match serde_json::from_slice::<HexTx>(body) {
        Ok(HexTx { tx }) => {
            hex::decode(tx.trim_start_matches("0x")).map_err(|e| format!("invalid hex: {e}"))
        }
        Err(_) => Ok(body.to_vec()),
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitTxResponse {
    pub status: &'static str,
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct RejectedTx {
    pub code: u32,
    pub log: String,
}

/// `POST /txs`
///
/// Runs the admission check and queues the transaction in the engine's
/// mempool. The block producer picks it up on a later tick.
pub async fn submit_tx(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitTxResponse>), (StatusCode, Json<RejectedTx>)> {
    let raw = submitted_bytes(&body).map_err(|log| {
        (
            StatusCode::BAD_REQUEST,
            Json(RejectedTx { code: 1, log }),
        )
    })?;
    let hash = Hash256::compute(&raw).to_string();

    let res = state.engine.submit(raw);
    if !res.is_ok() {
        tracing::debug!(%hash, log = %res.log, "tx rejected");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(RejectedTx {
                code: res.code,
                log: res.log,
            }),
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTxResponse {
            status: "queued",
            hash,
        }),
    ))
}
