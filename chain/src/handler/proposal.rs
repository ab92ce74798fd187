use std::collections::HashSet;

use tracing::info;

use super::TxHandler;
use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{HacTx, ProposalTx, TxError, TxPayload, VoteCode};

fn body(tx: &HacTx) -> Result<&ProposalTx, StateError> {
    match &tx.payload {
        TxPayload::Proposal(body) => Ok(body),
        _ => Err(TxError::UnmatchedTxType.into()),
    }
}

/// Creates proposals. One per validator per block.
#[derive(Debug, Default)]
pub struct ProposalTxHandler {
    seen: HashSet<u64>,
}

impl ProposalTxHandler {
    fn handle(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        if self.seen.contains(&tx.validator) {
            return Err(StateError::OneActionPerBlock);
        }
        let event = st.proposal(body(tx)?, tx.validator, false, code)?;
        self.seen.insert(tx.validator);
        Ok(event
            .map(|e| ExecTxResult::with_event(e.encode()))
            .unwrap_or_default())
    }
}

impl TxHandler for ProposalTxHandler {
    // The block's code is unknown at admission time, so both outcomes
    // must be acceptable.
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError> {
        let body = body(tx)?;
        for code in [VoteCode::IgnoreProposal, VoteCode::ProcessProposal] {
            st.proposal(body, tx.validator, true, Some(code))
                .inspect_err(|e| info!(error = %e, "check proposal tx failed"))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::dummy_genesis;
    use crate::types::{EventProposal, START_ACCOUNT_INDEX};

    fn dummy_tx(validator: u64) -> HacTx {
        HacTx::new(
            0,
            validator,
            TxPayload::Proposal(ProposalTx {
                title: "T".to_string(),
                data: b"D".to_vec(),
                ..ProposalTx::default()
            }),
        )
    }

    #[test]
    fn second_proposal_from_same_validator_is_rejected() {
        let mut st = dummy_genesis(&[1000]);
        let mut h = ProposalTxHandler::default();
        h.new_context();

        let res = h
            .process(&mut st, &dummy_tx(START_ACCOUNT_INDEX), Some(VoteCode::ProcessProposal))
            .expect("first proposal");
        let ev = EventProposal::decode(&res.events[0]).expect("proposal event");
        assert_eq!(ev.proposal_index, 1);

        let mut fresh = st.next_state();
        let err = h
            .process(&mut fresh, &dummy_tx(START_ACCOUNT_INDEX), Some(VoteCode::ProcessProposal))
            .unwrap_err();
        assert!(matches!(err, StateError::OneActionPerBlock));

        h.new_context();
        h.process(&mut fresh, &dummy_tx(START_ACCOUNT_INDEX), Some(VoteCode::IgnoreProposal))
            .expect("allowed after context reset");
    }

    #[test]
    fn check_does_not_mutate() {
        let mut st = dummy_genesis(&[1000]);
        let h = ProposalTxHandler::default();
        h.check(&mut st, &dummy_tx(START_ACCOUNT_INDEX)).expect("check");
        assert_eq!(st.proposal_max(), 0);
        assert_eq!(st.get_account(START_ACCOUNT_INDEX).unwrap().nonce, 0);
    }
}
