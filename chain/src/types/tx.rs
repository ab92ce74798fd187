//! Transaction envelope, payload variants and the JSON wire codec.
//!
//! Every transaction travels as a JSON object
//! `{version, type, nonce, validator, tx, sig}`. The numeric `type` tag
//! selects how `tx` is decoded. Byte fields are base64 strings. The signing
//! bytes are the same envelope with `sig` replaced by a single entry
//! holding the chain id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::base64_bytes;

/// Envelope version produced by this node.
pub const TX_VERSION: u8 = 1;

/// Errors raised while decoding or signing a transaction.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("invalid tx: {0}")]
    InvalidTx(#[from] serde_json::Error),

    #[error("unsupported tx type {0}")]
    UnsupportedTxType(u8),

    /// Payload does not match the handler it was routed to.
    #[error("unmatched tx type")]
    UnmatchedTxType,
}

/// Numeric transaction tag carried in the envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TxType {
    Proposal,
    Discussion,
    Grant,
    Retract,
    SettleProposal,
}

impl TxType {
    pub fn tag(self) -> u8 {
        match self {
            TxType::Proposal => 1,
            TxType::Discussion => 2,
            TxType::Grant => 3,
            TxType::Retract => 4,
            TxType::SettleProposal => 5,
        }
    }

    /// Proposer actions need an oracle decision and are limited to one
    /// per block.
    pub fn is_proposer_action(self) -> bool {
        matches!(
            self,
            TxType::Grant | TxType::Proposal | TxType::SettleProposal
        )
    }
}

impl From<TxType> for u8 {
    fn from(t: TxType) -> Self {
        t.tag()
    }
}

impl TryFrom<u8> for TxType {
    type Error = TxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TxType::Proposal),
            2 => Ok(TxType::Discussion),
            3 => Ok(TxType::Grant),
            4 => Ok(TxType::Retract),
            5 => Ok(TxType::SettleProposal),
            other => Err(TxError::UnsupportedTxType(other)),
        }
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxType::Proposal => "proposal",
            TxType::Discussion => "discussion",
            TxType::Grant => "grant",
            TxType::Retract => "retract",
            TxType::SettleProposal => "settle_proposal",
        };
        f.write_str(name)
    }
}

/// Block-wide decision derived from the oracle.
///
/// A block without a proposer action carries no code; that is modelled as
/// `Option<VoteCode>::None` and reported as `0` on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VoteCode {
    IgnoreProposal,
    ProcessProposal,
    AcceptProposal,
    RejectProposal,
    GrantNewMember,
    RejectNewMember,
}

impl VoteCode {
    pub fn code(self) -> i64 {
        match self {
            VoteCode::IgnoreProposal => 200,
            VoteCode::ProcessProposal => 201,
            VoteCode::AcceptProposal => 202,
            VoteCode::RejectProposal => 203,
            VoteCode::GrantNewMember => 204,
            VoteCode::RejectNewMember => 205,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            200 => Some(VoteCode::IgnoreProposal),
            201 => Some(VoteCode::ProcessProposal),
            202 => Some(VoteCode::AcceptProposal),
            203 => Some(VoteCode::RejectProposal),
            204 => Some(VoteCode::GrantNewMember),
            205 => Some(VoteCode::RejectNewMember),
            _ => None,
        }
    }

    /// Wire value of an optional code, `0` meaning "no code".
    pub fn to_wire(code: Option<VoteCode>) -> i64 {
        code.map(VoteCode::code).unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProposalTx {
    pub proposer: u64,
    #[serde(rename = "endHeight")]
    pub end_height: u64,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub title: String,
    pub link: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscussionTx {
    pub proposal: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// One membership grant: a candidate key and the stake it receives.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GrantSt {
    pub statement: String,
    pub amount: u64,
    #[serde(rename = "agentUrl")]
    pub agent_url: String,
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub pubkey: Vec<u8>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GrantTx {
    pub grants: Vec<GrantSt>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SettleProposalTx {
    pub proposal: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetractTx {
    pub amount: u64,
}

/// Closed set of transaction bodies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxPayload {
    Proposal(ProposalTx),
    Discussion(DiscussionTx),
    Grant(GrantTx),
    Retract(RetractTx),
    SettleProposal(SettleProposalTx),
}

impl TxPayload {
    pub fn tx_type(&self) -> TxType {
        match self {
            TxPayload::Proposal(_) => TxType::Proposal,
            TxPayload::Discussion(_) => TxType::Discussion,
            TxPayload::Grant(_) => TxType::Grant,
            TxPayload::Retract(_) => TxType::Retract,
            TxPayload::SettleProposal(_) => TxType::SettleProposal,
        }
    }
}

/// A decoded transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HacTx {
    pub version: u8,
    pub nonce: u64,
    /// Index of the signing account.
    pub validator: u64,
    pub payload: TxPayload,
    pub sig: Vec<Vec<u8>>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u8,
    #[serde(rename = "type")]
    tx_type: TxType,
    nonce: u64,
    validator: u64,
    tx: &'a T,
    #[serde(with = "base64_bytes::list")]
    sig: &'a [Vec<u8>],
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u8,
    nonce: u64,
    validator: u64,
    tx: T,
    #[serde(with = "base64_bytes::list", default)]
    sig: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    tx_type: u8,
}

impl HacTx {
    pub fn new(nonce: u64, validator: u64, payload: TxPayload) -> Self {
        Self {
            version: TX_VERSION,
            nonce,
            validator,
            payload,
            sig: Vec::new(),
        }
    }

    pub fn tx_type(&self) -> TxType {
        self.payload.tx_type()
    }

    fn encode_with_sig(&self, sig: &[Vec<u8>]) -> Result<Vec<u8>, TxError> {
        fn enc<T: Serialize>(tx: &HacTx, body: &T, sig: &[Vec<u8>]) -> Result<Vec<u8>, TxError> {
            let env = EnvelopeRef {
                version: tx.version,
                tx_type: tx.tx_type(),
                nonce: tx.nonce,
                validator: tx.validator,
                tx: body,
                sig,
            };
            Ok(serde_json::to_vec(&env)?)
        }

        match &self.payload {
            TxPayload::Proposal(body) => enc(self, body, sig),
            TxPayload::Discussion(body) => enc(self, body, sig),
            TxPayload::Grant(body) => enc(self, body, sig),
            TxPayload::Retract(body) => enc(self, body, sig),
            TxPayload::SettleProposal(body) => enc(self, body, sig),
        }
    }

    /// Canonical wire encoding.
    pub fn marshal(&self) -> Result<Vec<u8>, TxError> {
        self.encode_with_sig(&self.sig)
    }

    /// Decodes wire bytes, dispatching on the `type` tag.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, TxError> {
        let tag: TypeTag = serde_json::from_slice(bytes)?;
        let payload_type = TxType::try_from(tag.tx_type)?;

        fn dec<T: for<'de> Deserialize<'de>>(
            bytes: &[u8],
            wrap: fn(T) -> TxPayload,
        ) -> Result<HacTx, TxError> {
            let env: Envelope<T> = serde_json::from_slice(bytes)?;
            Ok(HacTx {
                version: env.version,
                nonce: env.nonce,
                validator: env.validator,
                payload: wrap(env.tx),
                sig: env.sig,
            })
        }

        match payload_type {
            TxType::Proposal => dec(bytes, TxPayload::Proposal),
            TxType::Discussion => dec(bytes, TxPayload::Discussion),
            TxType::Grant => dec(bytes, TxPayload::Grant),
            TxType::Retract => dec(bytes, TxPayload::Retract),
            TxType::SettleProposal => dec(bytes, TxPayload::SettleProposal),
        }
    }

    /// Bytes covered by the signature: the envelope with `sig` set to
    /// `[chain_id]`.
    pub fn sig_data(&self, chain_id: &str) -> Result<Vec<u8>, TxError> {
        self.encode_with_sig(&[chain_id.as_bytes().to_vec()])
    }

    /// Replaces the signature list with one Ed25519 signature by `key`.
    pub fn sign(
        &mut self,
        chain_id: &str,
        key: &ed25519_dalek::SigningKey,
    ) -> Result<(), TxError> {
        use ed25519_dalek::Signer;

        let msg = self.sig_data(chain_id)?;
        self.sig = vec![key.sign(&msg).to_bytes().to_vec()];
        Ok(())
    }
}
