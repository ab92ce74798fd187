//! Request/response pairs of the block-execution protocol.
//!
//! These mirror the messages a consensus engine exchanges with the
//! application for each height, without tying the crate to a particular
//! engine's wire encoding.

use serde::{Deserialize, Serialize};

use crate::types::{Event, Hash256, ValidatorUpdate};

/// Response code for success.
pub const CODE_OK: u32 = 0;
/// Response code for a rejected transaction or a failed query.
pub const CODE_ERR: u32 = 1;
/// Response code for an unknown query path.
pub const CODE_UNKNOWN_PATH: u32 = 404;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InitChainRequest {
    pub chain_id: String,
    /// Genesis validators; power is converted to stake at the genesis rate.
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InitChainResponse {
    pub app_hash: Hash256,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InfoResponse {
    pub last_block_height: u64,
    pub last_block_app_hash: Hash256,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckTxResponse {
    pub code: u32,
    pub log: String,
}

impl CheckTxResponse {
    pub fn rejected(log: impl Into<String>) -> Self {
        Self {
            code: CODE_ERR,
            log: log.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PrepareProposalRequest {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PrepareProposalResponse {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessProposalRequest {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProposalVerdict {
    #[default]
    Reject,
    Accept,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessProposalResponse {
    pub status: ProposalVerdict,
    /// Block vote code, `0` when the block has no proposer action.
    pub vote_code: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FinalizeBlockRequest {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
    pub vote_code: i64,
}

/// Result of executing one transaction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecTxResult {
    pub code: u32,
    pub log: String,
    pub events: Vec<Event>,
}

impl ExecTxResult {
    pub fn with_event(event: Event) -> Self {
        Self {
            code: CODE_OK,
            log: String::new(),
            events: vec![event],
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FinalizeBlockResponse {
    pub tx_results: Vec<ExecTxResult>,
    pub app_hash: Hash256,
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommitResponse {
    pub height: u64,
    pub app_hash: Hash256,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub path: String,
    pub data: Vec<u8>,
    /// Committed height to read. Zero reads the latest commit.
    #[serde(default)]
    pub height: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub code: u32,
    pub log: String,
    pub value: Vec<u8>,
    pub height: u64,
}

impl QueryResponse {
    pub fn failed(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
            ..Self::default()
        }
    }
}
