//! Proposal and discussion records.

use serde::{Deserialize, Serialize};

use super::base64_bytes;

/// Lifecycle of a proposal.
///
/// `Ignored` is terminal at creation. `Processing` moves to `Accepted` or
/// `Rejected` exactly once, through settlement by its proposer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum ProposalStatus {
    Ignored,
    Processing,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn code(self) -> u64 {
        match self {
            ProposalStatus::Ignored => 1,
            ProposalStatus::Processing => 2,
            ProposalStatus::Accepted => 3,
            ProposalStatus::Rejected => 4,
        }
    }
}

impl From<ProposalStatus> for u64 {
    fn from(status: ProposalStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u64> for ProposalStatus {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProposalStatus::Ignored),
            2 => Ok(ProposalStatus::Processing),
            3 => Ok(ProposalStatus::Accepted),
            4 => Ok(ProposalStatus::Rejected),
            other => Err(format!("unknown proposal status {other}")),
        }
    }
}

/// A governance proposal as stored in state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub index: u64,
    pub proposer: u64,
    pub proposer_address: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub title: String,
    pub link: String,
    pub image_url: String,
    /// Height by which the proposer intends to settle.
    pub end_height: u64,
    /// Height of the block that created the proposal.
    pub height: u64,
    pub status: ProposalStatus,
    /// Height of the block that settled the proposal, if any.
    pub settle_height: Option<u64>,
}

/// A comment attached to a proposal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub index: u64,
    pub proposal: u64,
    pub speaker: u64,
    pub speaker_address: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub height: u64,
}
