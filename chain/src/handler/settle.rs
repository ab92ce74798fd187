use std::collections::HashSet;

use tracing::info;

use super::TxHandler;
use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{HacTx, SettleProposalTx, TxError, TxPayload, VoteCode};

fn body(tx: &HacTx) -> Result<&SettleProposalTx, StateError> {
    match &tx.payload {
        TxPayload::SettleProposal(body) => Ok(body),
        _ => Err(TxError::UnmatchedTxType.into()),
    }
}

/// Settles proposals. One per validator per block.
#[derive(Debug, Default)]
pub struct SettleProposalTxHandler {
    seen: HashSet<u64>,
}

impl SettleProposalTxHandler {
    fn handle(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        if self.seen.contains(&tx.validator) {
            return Err(StateError::OneActionPerBlock);
        }
        let event = st.settle_proposal(body(tx)?, tx.validator, false, code)?;
        self.seen.insert(tx.validator);
        Ok(event
            .map(|e| ExecTxResult::with_event(e.encode()))
            .unwrap_or_default())
    }
}

impl TxHandler for SettleProposalTxHandler {
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError> {
        let body = body(tx)?;
        for code in [VoteCode::AcceptProposal, VoteCode::RejectProposal] {
            st.settle_proposal(body, tx.validator, true, Some(code))
                .inspect_err(|e| info!(error = %e, "check settle proposal tx failed"))?;
        }
        Ok(())
    }

    fn new_context(&mut self) {
        self.seen.clear();
    }

    fn prepare(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        self.handle(st, tx, code)
    }

    fn process(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        self.handle(st, tx, code)
    }
}
