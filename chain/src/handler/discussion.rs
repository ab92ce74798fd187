use tracing::info;

use super::TxHandler;
use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{DiscussionTx, HacTx, TxError, TxPayload, VoteCode};

fn body(tx: &HacTx) -> Result<&DiscussionTx, StateError> {
    match &tx.payload {
        TxPayload::Discussion(body) => Ok(body),
        _ => Err(TxError::UnmatchedTxType.into()),
    }
}

/// Appends discussion entries. Not limited per block.
#[derive(Debug, Default)]
pub struct DiscussionTxHandler;

impl DiscussionTxHandler {
    fn handle(&self, st: &mut State, tx: &HacTx) -> Result<ExecTxResult, StateError> {
        let event = st.discussion(body(tx)?, tx.validator, false)?;
        Ok(event
            .map(|e| ExecTxResult::with_event(e.encode()))
            .unwrap_or_default())
    }
}

impl TxHandler for DiscussionTxHandler {
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError> {
        st.discussion(body(tx)?, tx.validator, true)
            .inspect_err(|e| info!(error = %e, "check discussion tx failed"))?;
        Ok(())
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
