//! Per-type transaction handlers.
//!
//! Each handler validates and applies one transaction kind against a
//! [`State`]:
//!
//! - `check`: non-mutating admission check for the mempool,
//! - `prepare`: speculative application while assembling a proposal,
//! - `process`: authoritative application during verification and
//!   finalization.
//!
//! Handlers that allow one action per validator per block keep a seen set
//! that `new_context` resets at the start of each pass over a block.

use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{HacTx, TxType, VoteCode};

pub mod discussion;
pub mod grant;
pub mod proposal;
pub mod retract;
pub mod settle;

pub use discussion::DiscussionTxHandler;
pub use grant::GrantTxHandler;
pub use proposal::ProposalTxHandler;
pub use retract::RetractTxHandler;
pub use settle::SettleProposalTxHandler;

pub trait TxHandler: Send {
    /// Cheap validation against the committed state.
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError>;

    /// Resets per-block bookkeeping.
    fn new_context(&mut self) {}

    fn prepare(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError>;

    fn process(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError>;
}

/// One handler per transaction type.
#[derive(Default)]
pub struct TxHandlers {
    grant: GrantTxHandler,
    proposal: ProposalTxHandler,
    settle: SettleProposalTxHandler,
    discussion: DiscussionTxHandler,
    retract: RetractTxHandler,
}

impl TxHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tx_type: TxType) -> &dyn TxHandler {
        match tx_type {
            TxType::Grant => &self.grant,
            TxType::Proposal => &self.proposal,
            TxType::SettleProposal => &self.settle,
            TxType::Discussion => &self.discussion,
            TxType::Retract => &self.retract,
        }
    }

    pub fn get_mut(&mut self, tx_type: TxType) -> &mut dyn TxHandler {
        match tx_type {
            TxType::Grant => &mut self.grant,
            TxType::Proposal => &mut self.proposal,
            TxType::SettleProposal => &mut self.settle,
            TxType::Discussion => &mut self.discussion,
            TxType::Retract => &mut self.retract,
        }
    }

    pub fn new_context(&mut self) {
        self.grant.new_context();
        self.proposal.new_context();
        self.settle.new_context();
        self.discussion.new_context();
        self.retract.new_context();
    }
}
