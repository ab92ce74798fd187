use std::collections::HashSet;

use tracing::info;

use super::TxHandler;
use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{HacTx, RetractTx, TxError, TxPayload, VoteCode};

fn body(tx: &HacTx) -> Result<&RetractTx, StateError> {
    match &tx.payload {
        TxPayload::Retract(body) => Ok(body),
        _ => Err(TxError::UnmatchedTxType.into()),
    }
}

/// Retracts a member's whole stake. One per validator per block.
#[derive(Debug, Default)]
pub struct RetractTxHandler {
    seen: HashSet<u64>,
}

impl RetractTxHandler {
    fn handle(&mut self, st: &mut State, tx: &HacTx) -> Result<ExecTxResult, StateError> {
        if self.seen.contains(&tx.validator) {
            return Err(StateError::OneActionPerBlock);
        }
        let event = st.unstake(body(tx)?, tx.validator, false)?;
        self.seen.insert(tx.validator);
        Ok(event
            .map(|e| ExecTxResult::with_event(e.encode()))
            .unwrap_or_default())
    }
}

impl TxHandler for RetractTxHandler {
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError> {
        st.unstake(body(tx)?, tx.validator, true)
            .inspect_err(|e| info!(error = %e, "check retract tx failed"))?;
        Ok(())
    }

    fn new_context(&mut self) {
        self.seen.clear();
    }

    fn prepare(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        _code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        self.handle(st, tx)
    }

    fn process(
        &mut self,
        st: &mut State,
        tx: &HacTx,
        _code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        self.handle(st, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::dummy_genesis;
    use crate::types::{EventUnStake, START_ACCOUNT_INDEX};

    fn dummy_tx(amount: u64) -> HacTx {
        HacTx::new(0, START_ACCOUNT_INDEX, TxPayload::Retract(RetractTx { amount }))
    }

    #[test]
    fn partial_retract_is_refused() {
        let mut st = dummy_genesis(&[1000]);
        let mut h = RetractTxHandler::default();

        let err = h.check(&mut st, &dummy_tx(500)).unwrap_err();
        assert_eq!(err.to_string(), "must retract all");
        let err = h.process(&mut st, &dummy_tx(500), None).unwrap_err();
        assert!(matches!(err, StateError::MustRetractAll));

        let res = h.process(&mut st, &dummy_tx(1000), None).expect("full retract");
        let ev = EventUnStake::decode(&res.events[0]).expect("retract event");
        assert_eq!(ev.amount, 1000);
        assert_eq!(st.get_account(START_ACCOUNT_INDEX).unwrap().stake, 0);

        let err = h.process(&mut st, &dummy_tx(0), None).unwrap_err();
        assert!(matches!(err, StateError::OneActionPerBlock));
    }
}
