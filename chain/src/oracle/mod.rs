//! Agent oracle consulted once per block.
//!
//! The oracle turns advisory yes/no answers from the agent service into
//! binding vote codes. Implementations must be thread-safe: the driver may
//! call them from the mempool path and the block path concurrently.
//!
//! - [`HttpOracle`] talks to the agent service over HTTP.
//! - [`StaticOracle`] returns fixed answers, for tests and devnets.

use thiserror::Error;

use crate::types::Proposal;

pub mod http;

pub use http::HttpOracle;

/// Failure to obtain an answer from the oracle.
///
/// Any of these makes the block's vote code unknowable, so the block
/// cannot carry a proposer action.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Network-level or client construction failure.
    #[error("oracle transport: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("oracle service: {0}")]
    Service(String),

    /// The response body did not match the expected schema.
    #[error("oracle protocol: {0}")]
    Protocol(String),
}

/// Advisory decisions for proposer actions.
pub trait Oracle: Send + Sync {
    /// Whether a new proposal enters the `Processing` state.
    fn if_process_proposal(&self, proposer: u64, data: &[u8]) -> Result<bool, OracleError>;

    /// Whether a processing proposal is accepted when settled.
    fn if_accept_proposal(&self, proposal: &Proposal, voter: &str) -> Result<bool, OracleError>;

    /// Whether a grant candidate becomes a member.
    ///
    /// `grant_id` is the account index the grant consumes.
    fn if_grant_new_member(
        &self,
        grant_id: u64,
        proposer: &str,
        amount: u64,
        statement: &str,
    ) -> Result<bool, OracleError>;
}

/// Oracle with fixed answers.
#[derive(Clone, Copy, Debug)]
pub struct StaticOracle {
    pub process_proposal: bool,
    pub accept_proposal: bool,
    pub grant_new_member: bool,
}

impl StaticOracle {
    /// Says yes to everything.
    pub fn approving() -> Self {
        Self {
            process_proposal: true,
            accept_proposal: true,
            grant_new_member: true,
        }
    }

    /// Admits proposals but rejects settlements and grants.
    pub fn rejecting() -> Self {
        Self {
            process_proposal: true,
            accept_proposal: false,
            grant_new_member: false,
        }
    }
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self::approving()
    }
}

impl Oracle for StaticOracle {
    fn if_process_proposal(&self, _proposer: u64, _data: &[u8]) -> Result<bool, OracleError> {
        Ok(self.process_proposal)
    }

    fn if_accept_proposal(&self, _proposal: &Proposal, _voter: &str) -> Result<bool, OracleError> {
        Ok(self.accept_proposal)
    }

    fn if_grant_new_member(
        &self,
        _grant_id: u64,
        _proposer: &str,
        _amount: u64,
        _statement: &str,
    ) -> Result<bool, OracleError> {
        Ok(self.grant_new_member)
    }
}
