//! Block-wide vote code derived from the oracle.
//!
//! A block carries at most one proposer action (grant, proposal or
//! settlement). The oracle is asked about that action once, and its
//! yes/no answer becomes the code every transaction of the block is
//! applied with. Blocks without a proposer action have no code.

use tracing::debug;

use super::AppError;
use crate::oracle::Oracle;
use crate::state::{State, StateError};
use crate::types::{HacTx, TxPayload, VoteCode};

/// Computes the vote code for `txs` against the block's starting state.
///
/// Transactions whose signer or signature do not verify are skipped, as
/// they will be dropped later anyway. A second proposer action fails with
/// [`AppError::MultiProposalInOneBlock`]; oracle failures propagate.
pub fn block_vote_code<'a, I>(
    st: &State,
    txs: I,
    oracle: &dyn Oracle,
) -> Result<Option<VoteCode>, AppError>
where
    I: IntoIterator<Item = &'a HacTx>,
{
    let mut code = None;
    let mut proposer_act = false;
    for tx in txs {
        if !tx.tx_type().is_proposer_action() {
            continue;
        }
        if let Err(e) = st.verify(tx, true) {
            debug!(validator = tx.validator, error = %e, "skip unverifiable proposer action");
            continue;
        }
        if proposer_act {
            return Err(AppError::MultiProposalInOneBlock);
        }
        proposer_act = true;
        code = decide(st, tx, oracle)?;
    }
    Ok(code)
}

fn decide(st: &State, tx: &HacTx, oracle: &dyn Oracle) -> Result<Option<VoteCode>, AppError> {
    let code = match &tx.payload {
        TxPayload::Grant(body) => {
            let [grant] = body.grants.as_slice() else {
                return Err(StateError::OnlyOneGrant.into());
            };
            let proposer = st.get_account(tx.validator)?;
            let yes = oracle.if_grant_new_member(
                st.header().account_idx,
                &proposer.address().to_string(),
                grant.amount,
                &grant.statement,
            )?;
            if yes {
                VoteCode::GrantNewMember
            } else {
                VoteCode::RejectNewMember
            }
        }
        TxPayload::Proposal(body) => {
            if oracle.if_process_proposal(body.proposer, &body.data)? {
                VoteCode::ProcessProposal
            } else {
                VoteCode::IgnoreProposal
            }
        }
        TxPayload::SettleProposal(body) => {
            let voter = st.get_account(tx.validator)?;
            let proposal = st.get_proposal(body.proposal)?;
            if oracle.if_accept_proposal(&proposal, &voter.address().to_string())? {
                VoteCode::AcceptProposal
            } else {
                VoteCode::RejectProposal
            }
        }
        TxPayload::Discussion(_) | TxPayload::Retract(_) => return Ok(None),
    };
    Ok(Some(code))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::oracle::{OracleError, StaticOracle};
    use crate::state::tests::{dummy_genesis, dummy_key, dummy_pub};
    use crate::types::{
        DiscussionTx, GrantSt, GrantTx, Proposal, ProposalTx, START_ACCOUNT_INDEX,
        SettleProposalTx,
    };

    /// Counts calls and forwards to a fixed oracle.
    #[derive(Default)]
    pub(crate) struct CountingOracle {
        pub(crate) inner: StaticOracle,
        pub(crate) calls: AtomicUsize,
        pub(crate) grant_ids: parking_lot::Mutex<Vec<u64>>,
    }

    impl CountingOracle {
        pub(crate) fn new(inner: StaticOracle) -> Self {
            Self {
                inner,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Oracle for CountingOracle {
        fn if_process_proposal(&self, proposer: u64, data: &[u8]) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.if_process_proposal(proposer, data)
        }

        fn if_accept_proposal(&self, proposal: &Proposal, voter: &str) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.if_accept_proposal(proposal, voter)
        }

        fn if_grant_new_member(
            &self,
            grant_id: u64,
            proposer: &str,
            amount: u64,
            statement: &str,
        ) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.grant_ids.lock().push(grant_id);
            self.inner
                .if_grant_new_member(grant_id, proposer, amount, statement)
        }
    }

    struct DownOracle;

    impl Oracle for DownOracle {
        fn if_process_proposal(&self, _: u64, _: &[u8]) -> Result<bool, OracleError> {
            Err(OracleError::Transport("down".to_string()))
        }

        fn if_accept_proposal(&self, _: &Proposal, _: &str) -> Result<bool, OracleError> {
            Err(OracleError::Transport("down".to_string()))
        }

        fn if_grant_new_member(&self, _: u64, _: &str, _: u64, _: &str) -> Result<bool, OracleError> {
            Err(OracleError::Transport("down".to_string()))
        }
    }

    fn signed(st: &State, nonce: u64, payload: TxPayload) -> HacTx {
        let mut tx = HacTx::new(nonce, START_ACCOUNT_INDEX, payload);
        tx.sign(&st.header().chain_id, &dummy_key(1)).unwrap();
        tx
    }

    fn proposal_tx(st: &State) -> HacTx {
        signed(
            st,
            0,
            TxPayload::Proposal(ProposalTx {
                title: "T".to_string(),
                ..ProposalTx::default()
            }),
        )
    }

    fn grant_tx(st: &State, grants: usize) -> HacTx {
        let grants = (0..grants)
            .map(|i| GrantSt {
                amount: 5,
                pubkey: dummy_pub(10 + i as u8).as_bytes().to_vec(),
                ..GrantSt::default()
            })
            .collect();
        signed(st, 0, TxPayload::Grant(GrantTx { grants }))
    }

    #[test]
    fn no_proposer_action_means_no_code() {
        let st = dummy_genesis(&[1000]);
        let oracle = CountingOracle::new(StaticOracle::approving());
        let txs = vec![signed(
            &st,
            0,
            TxPayload::Discussion(DiscussionTx::default()),
        )];
        assert_eq!(block_vote_code(&st, &txs, &oracle).unwrap(), None);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn proposal_code_follows_oracle() {
        let st = dummy_genesis(&[1000]);
        let txs = vec![proposal_tx(&st)];
        let code = block_vote_code(&st, &txs, &StaticOracle::approving()).unwrap();
        assert_eq!(code, Some(VoteCode::ProcessProposal));

        let no = StaticOracle {
            process_proposal: false,
            ..StaticOracle::approving()
        };
        let code = block_vote_code(&st, &txs, &no).unwrap();
        assert_eq!(code, Some(VoteCode::IgnoreProposal));
    }

    #[test]
    fn second_proposer_action_fails() {
        let st = dummy_genesis(&[1000]);
        let txs = vec![proposal_tx(&st), grant_tx(&st, 1)];
        let err = block_vote_code(&st, &txs, &StaticOracle::approving()).unwrap_err();
        assert!(matches!(err, AppError::MultiProposalInOneBlock));
        assert_eq!(err.to_string(), "multi proposal in one block");
    }

    #[test]
    fn grant_asks_with_next_account_index() {
        let st = dummy_genesis(&[1000]);
        let oracle = CountingOracle::new(StaticOracle::rejecting());
        let code = block_vote_code(&st, &[grant_tx(&st, 1)], &oracle).unwrap();
        assert_eq!(code, Some(VoteCode::RejectNewMember));
        assert_eq!(*oracle.grant_ids.lock(), vec![START_ACCOUNT_INDEX + 1]);

        let err = block_vote_code(&st, &[grant_tx(&st, 2)], &oracle).unwrap_err();
        assert!(matches!(err, AppError::State(StateError::OnlyOneGrant)));
    }

    #[test]
    fn settle_of_missing_proposal_fails() {
        let st = dummy_genesis(&[1000]);
        let tx = signed(
            &st,
            0,
            TxPayload::SettleProposal(SettleProposalTx { proposal: 9 }),
        );
        let err = block_vote_code(&st, &[tx], &StaticOracle::approving()).unwrap_err();
        assert!(matches!(
            err,
            AppError::State(StateError::ProposalNotExists(9))
        ));
    }

    #[test]
    fn oracle_failure_propagates() {
        let st = dummy_genesis(&[1000]);
        let txs = vec![grant_tx(&st, 1)];
        let err = block_vote_code(&st, &txs, &DownOracle).unwrap_err();
        assert!(matches!(err, AppError::Oracle(OracleError::Transport(_))));
    }

    #[test]
    fn unsigned_proposer_action_is_skipped() {
        let st = dummy_genesis(&[1000]);
        let mut tx = proposal_tx(&st);
        tx.sig.clear();
        let oracle = CountingOracle::new(StaticOracle::approving());
        assert_eq!(block_vote_code(&st, &[tx], &oracle).unwrap(), None);
        assert_eq!(oracle.calls(), 0);
    }
}
