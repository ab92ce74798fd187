use tracing::info;

use super::TxHandler;
use crate::consensus::abci::ExecTxResult;
use crate::state::{State, StateError};
use crate::types::{GrantSt, HacTx, TxError, TxPayload, VoteCode};

/// The single grant entry of a grant transaction.
pub fn single_grant(tx: &HacTx) -> Result<&GrantSt, StateError> {
    match &tx.payload {
        TxPayload::Grant(body) => match body.grants.as_slice() {
            [grant] => Ok(grant),
            _ => Err(StateError::OnlyOneGrant),
        },
        _ => Err(TxError::UnmatchedTxType.into()),
    }
}

/// Admits new members according to the block's grant decision.
#[derive(Debug, Default)]
pub struct GrantTxHandler;

impl GrantTxHandler {
    fn handle(
        &self,
        st: &mut State,
        tx: &HacTx,
        code: Option<VoteCode>,
    ) -> Result<ExecTxResult, StateError> {
        let grant = single_grant(tx)?;
        let event = st.grant(
            tx.validator,
            &grant.pubkey,
            grant.amount,
            &grant.agent_url,
            &grant.name,
            code,
        )?;
        Ok(ExecTxResult::with_event(event.encode()))
    }
}

impl TxHandler for GrantTxHandler {
    fn check(&self, st: &mut State, tx: &HacTx) -> Result<(), StateError> {
        let grant = single_grant(tx)?;
        st.check_grant(tx.validator, &grant.pubkey)
            .inspect_err(|e| info!(error = %e, "check grant tx failed"))?;
        Ok(())
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
    use crate::state::tests::{dummy_genesis, dummy_pub};
    use crate::types::{EventGrant, GrantTx, START_ACCOUNT_INDEX};

    fn dummy_tx(grants: Vec<GrantSt>) -> HacTx {
        HacTx::new(0, START_ACCOUNT_INDEX, TxPayload::Grant(GrantTx { grants }))
    }

    fn dummy_grant(seed: u8) -> GrantSt {
        GrantSt {
            statement: "join".to_string(),
            amount: 3_000_000_000,
            pubkey: dummy_pub(seed).as_bytes().to_vec(),
            ..GrantSt::default()
        }
    }

    #[test]
    fn exactly_one_grant_entry() {
        let mut st = dummy_genesis(&[1000]);
        let h = GrantTxHandler;
        let err = h.check(&mut st, &dummy_tx(vec![])).unwrap_err();
        assert!(matches!(err, StateError::OnlyOneGrant));
        let err = h
            .check(&mut st, &dummy_tx(vec![dummy_grant(7), dummy_grant(8)]))
            .unwrap_err();
        assert!(matches!(err, StateError::OnlyOneGrant));
        h.check(&mut st, &dummy_tx(vec![dummy_grant(7)])).expect("one grant");
    }

    #[test]
    fn existing_key_cannot_be_granted_again() {
        let mut st = dummy_genesis(&[1000]);
        let mut h = GrantTxHandler;

        for amount in [0, 1, u64::MAX] {
            let mut grant = dummy_grant(1);
            grant.amount = amount;
            let err = h
                .process(&mut st, &dummy_tx(vec![grant]), Some(VoteCode::GrantNewMember))
                .unwrap_err();
            assert!(matches!(err, StateError::AccountAlreadyExists));
        }

        let res = h
            .process(&mut st, &dummy_tx(vec![dummy_grant(7)]), Some(VoteCode::GrantNewMember))
            .expect("grant new key");
        let ev = EventGrant::decode(&res.events[0]).expect("grant event");
        assert!(ev.grant);
        assert_eq!(ev.validator, START_ACCOUNT_INDEX + 1);

        let err = h
            .process(&mut st, &dummy_tx(vec![dummy_grant(7)]), Some(VoteCode::GrantNewMember))
            .unwrap_err();
        assert!(matches!(err, StateError::AccountAlreadyExists));
    }
}
