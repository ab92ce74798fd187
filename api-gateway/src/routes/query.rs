use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use hac_chain::consensus::abci::{CODE_OK, QueryRequest, QueryResponse};
use hac_chain::consensus::query::{PATH_ACCOUNTS, PATH_VALIDATORS};
use hac_chain::types::ADDRESS_LEN;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct QueryReply {
    pub height: u64,
    pub value: serde_json::Value,
}

/// Optional `?height=` selector. Absent or zero reads the latest commit.
#[derive(Debug, Default, Deserialize)]
pub struct AtHeight {
    #[serde(default)]
    pub height: u64,
}

type QueryResult = Result<Json<QueryReply>, (StatusCode, String)>;

fn reply(res: QueryResponse) -> QueryResult {
    if res.code != CODE_OK {
        let status = if res.log == "account noexists" {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_REQUEST
        };
        return Err((status, res.log));
    }
    let value = serde_json::from_slice(&res.value)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(QueryReply {
        height: res.height,
        value,
    }))
}

/// Query data for an account id: a hex address or a decimal index.
fn account_key(id: &str) -> Option<Vec<u8>> {
    let hex_id = id.trim_start_matches("0x");
    if hex_id.len() == ADDRESS_LEN * 2 {
        if let Ok(addr) = hex::decode(hex_id) {
            return Some(addr);
        }
    }
    id.parse::<u64>().ok().map(|idx| idx.to_be_bytes().to_vec())
}

/// `GET /accounts/{id}?height=`
pub async fn account(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(at): Query<AtHeight>,
) -> QueryResult {
    let data = account_key(&id).ok_or((
        StatusCode::BAD_REQUEST,
        "expected an account index or a hex address".to_string(),
    ))?;
    reply(state.engine.app().query(&QueryRequest {
        path: PATH_ACCOUNTS.to_string(),
        data,
        height: at.height,
    }))
}

/// `GET /validators`
pub async fn validators(State(state): State<SharedState>) -> QueryResult {
    reply(state.engine.app().query(&QueryRequest {
        path: PATH_VALIDATORS.to_string(),
        data: Vec::new(),
        height: 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_ids_parse_as_index_or_address() {
        assert_eq!(account_key("65536"), Some(65536u64.to_be_bytes().to_vec()));
        let addr = "ab".repeat(ADDRESS_LEN);
        assert_eq!(account_key(&addr), Some(vec![0xab; ADDRESS_LEN]));
        assert_eq!(account_key(&format!("0x{addr}")), Some(vec![0xab; ADDRESS_LEN]));
        assert_eq!(account_key("alice"), None);
    }
}
