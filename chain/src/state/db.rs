//! Owner of the committed ledger state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use super::{ReadView, SharedStore, State, StateError, StateHeader};
use crate::storage::{MerkleStore, StoreBackend};
use crate::types::{Account, Address, Hash256};

/// Committed state plus the shared store handle.
///
/// Readers (queries, CheckTx) see only the last committed version while a
/// candidate for the next block is built on a separate [`State`].
pub struct StateDB {
    store: SharedStore,
    state: RwLock<State>,
}

impl StateDB {
    /// Opens the store through `backend` and loads the latest committed
    /// state.
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self, StateError> {
        let store: SharedStore = Arc::new(RwLock::new(MerkleStore::open(backend)?));
        let mut st = State::load(store.clone(), ReadView::Committed).inspect_err(|e| {
            error!(error = %e, "load committed state failed");
        })?;
        st.validators()?;
        info!(
            height = st.height(),
            hash = %st.hash(),
            validators = st.validator_set().len(),
            "state db opened"
        );
        Ok(Self {
            store,
            state: RwLock::new(st),
        })
    }

    pub fn header(&self) -> StateHeader {
        self.state.read().header().clone()
    }

    /// Snapshot of the committed state for mempool checks.
    pub fn check_state(&self) -> State {
        self.state.read().clone()
    }

    /// Candidate state for the next block.
    pub fn new_state(&self) -> State {
        self.state.read().next_state()
    }

    /// Saves `st` as a new version and makes it the committed state.
    pub fn set_state(&self, mut st: State) -> Result<Hash256, StateError> {
        let mut committed = self.state.write();
        let hash = st.save()?;
        *committed = st.rebased(ReadView::Committed);
        Ok(hash)
    }

    /// Runs `read` against the state committed at `height`, or the latest
    /// committed state when `height` is zero. Returns the height read.
    fn read_at<T>(
        &self,
        height: u64,
        read: impl FnOnce(&State) -> Result<T, StateError>,
    ) -> Result<(T, u64), StateError> {
        let st = self.state.read();
        if height == 0 || height == st.height() {
            return Ok((read(&*st)?, st.height()));
        }
        if height > st.height() {
            return Err(StateError::UnknownHeight(height));
        }
        drop(st);
        let past = self.state_at(height)?;
        Ok((read(&past)?, height))
    }

    /// Read-only state as committed at `height`.
    ///
    /// Height `h` lives in store version `h + 1`; genesis is version one.
    /// Only point reads work on the result.
    pub fn state_at(&self, height: u64) -> Result<State, StateError> {
        let version = height
            .checked_add(1)
            .ok_or(StateError::UnknownHeight(height))?;
        if version > self.version() {
            return Err(StateError::UnknownHeight(height));
        }
        let st = State::load(self.store.clone(), ReadView::At(version))?;
        if st.height() != height {
            return Err(StateError::UnknownHeight(height));
        }
        Ok(st)
    }

    /// Account by index at `height` (zero for the latest commit), with the
    /// height read.
    pub fn account_by_index(
        &self,
        idx: u64,
        height: u64,
    ) -> Result<(Option<Account>, u64), StateError> {
        self.read_at(height, |st| match st.get_account(idx) {
            Ok(acnt) => Ok(Some(acnt.as_ref().clone())),
            Err(StateError::AccountNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        })
    }

    /// Account by address at `height` (zero for the latest commit), with
    /// the height read.
    pub fn account_by_address(
        &self,
        addr: &Address,
        height: u64,
    ) -> Result<(Option<Account>, u64), StateError> {
        self.read_at(height, |st| {
            Ok(st.find_account(addr)?.map(|a| a.as_ref().clone()))
        })
    }

    /// Accounts of the committed validator set, with the committed height.
    pub fn validator_accounts(&self) -> Result<(Vec<Account>, u64), StateError> {
        let st = self.state.read();
        let accounts = st
            .validator_accounts()?
            .into_iter()
            .map(|a| a.as_ref().clone())
            .collect();
        Ok((accounts, st.height()))
    }

    /// Version number of the last saved store version.
    pub fn version(&self) -> u64 {
        self.store.read().version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::dummy_pub;
    use crate::storage::MemBackend;
    use crate::types::{RetractTx, START_ACCOUNT_INDEX};

    fn dummy_db(stakes: &[u64]) -> StateDB {
        let db = StateDB::open(Box::new(MemBackend::new())).expect("open state db");
        let mut st = db.new_state();
        st.set_chain_id("hac-test");
        for (i, stake) in stakes.iter().enumerate() {
            st.add_account(Account::new(dummy_pub(i as u8 + 1), *stake))
                .expect("add account");
        }
        st.update().expect("update");
        db.set_state(st).expect("set state");
        db
    }

    #[test]
    fn fresh_db_starts_at_height_zero() {
        let db = StateDB::open(Box::new(MemBackend::new())).expect("open");
        assert_eq!(db.header().height, 0);
        assert!(db.header().hash.is_zero());
        assert_eq!(db.version(), 0);
    }

    #[test]
    fn candidate_heights_follow_commits() {
        let db = dummy_db(&[1000]);
        assert_eq!(db.header().height, 0);
        assert_eq!(db.new_state().height(), 1);

        let mut st = db.new_state();
        st.update().expect("update");
        db.set_state(st).expect("commit");
        assert_eq!(db.header().height, 1);
        assert_eq!(db.new_state().height(), 2);
    }

    #[test]
    fn committed_reads_do_not_see_candidate_writes() {
        let db = dummy_db(&[1000]);
        let mut st = db.new_state();
        st.unstake(&RetractTx { amount: 1000 }, START_ACCOUNT_INDEX, false)
            .expect("unstake");
        st.update().expect("update");

        let (acnt, _) = db.account_by_index(START_ACCOUNT_INDEX, 0).expect("query");
        assert_eq!(acnt.expect("account").stake, 1000);
        assert_eq!(
            db.check_state()
                .get_account(START_ACCOUNT_INDEX)
                .expect("check state read")
                .stake,
            1000
        );

        db.set_state(st).expect("commit");
        let (acnt, height) = db.account_by_index(START_ACCOUNT_INDEX, 0).expect("query");
        assert_eq!(acnt.expect("account").stake, 0);
        assert_eq!(height, 1);
    }

    #[test]
    fn lookups_by_address_and_missing_index() {
        let db = dummy_db(&[1000, 2000]);
        let (acnt, _) = db
            .account_by_address(&dummy_pub(2).address(), 0)
            .expect("query");
        assert_eq!(acnt.expect("account").index, START_ACCOUNT_INDEX + 1);

        let (missing, _) = db.account_by_index(7, 0).expect("query");
        assert!(missing.is_none());
    }

    #[test]
    fn past_heights_stay_queryable() {
        let db = dummy_db(&[1000]);
        let mut st = db.new_state();
        st.unstake(&RetractTx { amount: 1000 }, START_ACCOUNT_INDEX, false)
            .expect("unstake");
        st.update().expect("update");
        db.set_state(st).expect("commit 1");
        let mut st = db.new_state();
        st.update().expect("update");
        db.set_state(st).expect("commit 2");
        assert_eq!(db.header().height, 2);
        assert_eq!(db.version(), 3);

        let at = |height| {
            let (acnt, at) = db
                .account_by_index(START_ACCOUNT_INDEX, height)
                .expect("query");
            let acnt = acnt.expect("account");
            (acnt.stake, acnt.nonce, at)
        };
        assert_eq!(at(0), (0, 1, 2));
        assert_eq!(at(2), (0, 1, 2));
        assert_eq!(at(1), (0, 1, 1));

        let (acnt, height) = db
            .account_by_address(&dummy_pub(1).address(), 0)
            .expect("query");
        assert_eq!(acnt.expect("account").stake, 0);
        assert_eq!(height, 2);

        let genesis = db.state_at(0).expect("genesis state");
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.header().chain_id, "hac-test");
        let acnt = genesis
            .find_account(&dummy_pub(1).address())
            .expect("read")
            .expect("account");
        assert_eq!((acnt.stake, acnt.nonce), (1000, 0));

        assert!(matches!(
            db.account_by_index(START_ACCOUNT_INDEX, 3),
            Err(StateError::UnknownHeight(3))
        ));
    }
}
