//! Ledger state and its copy-on-write overlay.
//!
//! A [`State`] is one block's view of the ledger: a read handle on the
//! shared [`MerkleStore`] plus an in-memory overlay of the accounts,
//! proposal and discussions touched by the block. Nothing reaches the
//! store until [`State::update`], and nothing becomes durable until
//! [`State::save`].
//!
//! Overlay accounts are held as `Arc<Account>`, so cloning a state for a
//! speculative attempt copies map nodes only. Mutation goes through
//! `Arc::make_mut`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::storage::{MerkleStore, StorageError};
use crate::types::{
    Account, Address, Discussion, DiscussionTx, EventDiscussion, EventGrant, EventProposal,
    EventSettleProposal, EventUnStake, HacTx, Hash256, Proposal, ProposalStatus, ProposalTx,
    PublicKey, RetractTx, START_ACCOUNT_INDEX, SettleProposalTx, ValidatorUpdate, VoteCode,
};

pub mod db;
pub mod error;
pub mod keys;
pub mod validators;

pub use db::StateDB;
pub use error::StateError;
pub use validators::{MAX_VALIDATORS, ValidatorSet};

/// Store handle shared by the state database and every live state.
pub type SharedStore = Arc<RwLock<MerkleStore>>;

/// Persisted state header.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateHeader {
    pub height: u64,
    pub chain_id: String,
    /// Next account index to hand out.
    pub account_idx: u64,
    /// Merkle root of the last saved version.
    pub root_hash: Hash256,
    /// Application hash derived from `root_hash`. Zero until the first save.
    pub hash: Hash256,
}

impl Default for StateHeader {
    fn default() -> Self {
        Self {
            height: 0,
            chain_id: String::new(),
            account_idx: START_ACCOUNT_INDEX,
            root_hash: Hash256::ZERO,
            hash: Hash256::ZERO,
        }
    }
}

/// Application hash reported to consensus for a Merkle root.
pub fn app_hash(root: &Hash256) -> Hash256 {
    Hash256::compute(root.as_bytes())
}

/// Which layer of the store a state reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadView {
    /// Pending writes over the last saved version. Used by candidates.
    Working,
    /// Last saved version only. Used by the committed state and queries.
    Committed,
    /// A past saved version. Point reads only.
    At(u64),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Dirty {
    New,
    Modified,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StateError> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::standard(),
    )?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StateError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

#[derive(Clone)]
pub struct State {
    store: SharedStore,
    view: ReadView,

    header: StateHeader,
    validators: Vec<ValidatorUpdate>,
    idxs: HashMap<Address, u64>,
    acnts: HashMap<u64, Arc<Account>>,
    modified: BTreeMap<u64, Dirty>,

    proposal_max: u64,
    discussion_max: u64,
    mod_proposal: Option<Proposal>,
    new_discussions: BTreeMap<u64, Discussion>,
}

impl State {
    /// Loads header and counters from the store.
    pub(crate) fn load(store: SharedStore, view: ReadView) -> Result<Self, StateError> {
        let mut st = Self {
            store,
            view,
            header: StateHeader::default(),
            validators: Vec::new(),
            idxs: HashMap::new(),
            acnts: HashMap::new(),
            modified: BTreeMap::new(),
            proposal_max: 0,
            discussion_max: 0,
            mod_proposal: None,
            new_discussions: BTreeMap::new(),
        };

        st.proposal_max = st.read_counter(keys::KEY_PROPOSAL_INDEX)?;
        st.discussion_max = st.read_counter(keys::KEY_DISCUSSION_INDEX)?;
        if let Some(bytes) = st.read(keys::KEY_STATE)? {
            st.header = decode(&bytes)?;
            let root = {
                let store = st.store.read();
                match view {
                    ReadView::At(version) => store.root_at(version)?,
                    _ => store.root(),
                }
            };
            if !root.is_zero() {
                st.header.root_hash = root;
                st.header.hash = app_hash(&root);
            }
        }
        Ok(st)
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let store = self.store.read();
        let value = match self.view {
            ReadView::Working => store.get(key)?,
            ReadView::Committed => store.get_committed(key)?,
            ReadView::At(version) => store.get_at(version, key)?,
        };
        Ok(value)
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64, StateError> {
        Ok(self
            .read(key)?
            .and_then(|b| keys::decode_u64(&b))
            .unwrap_or(0))
    }

    fn iterate(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let store = self.store.read();
        let entries = match self.view {
            ReadView::Working => store.iterate(start, end)?,
            ReadView::Committed => store.iterate_committed(start, end)?,
            ReadView::At(_) => return Err(StorageError::HistoricalRange.into()),
        };
        Ok(entries)
    }

    /// Fresh candidate for the next block.
    ///
    /// The height advances only once this state has been saved; the state
    /// produced before genesis stays at height zero.
    pub fn next_state(&self) -> State {
        let mut header = self.header.clone();
        if !header.hash.is_zero() {
            header.height += 1;
        }
        State {
            store: self.store.clone(),
            view: ReadView::Working,
            header,
            validators: self.validators.clone(),
            idxs: HashMap::new(),
            acnts: HashMap::new(),
            modified: BTreeMap::new(),
            proposal_max: self.proposal_max,
            discussion_max: self.discussion_max,
            mod_proposal: None,
            new_discussions: BTreeMap::new(),
        }
    }

    /// Same ledger with an empty overlay, reading `view`.
    pub(crate) fn rebased(&self, view: ReadView) -> State {
        let mut st = self.next_state();
        st.header.height = self.header.height;
        st.view = view;
        st
    }

    pub fn header(&self) -> &StateHeader {
        &self.header
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn set_chain_id(&mut self, chain_id: &str) {
        self.header.chain_id = chain_id.to_string();
    }

    /// Application hash of the last save.
    pub fn hash(&self) -> Hash256 {
        self.header.hash
    }

    pub fn proposal_max(&self) -> u64 {
        self.proposal_max
    }

    pub fn discussion_max(&self) -> u64 {
        self.discussion_max
    }

    /// Account by index, from the overlay or the store.
    pub fn get_account(&self, idx: u64) -> Result<Arc<Account>, StateError> {
        if idx >= self.header.account_idx {
            return Err(StateError::AccountNotFound(idx));
        }
        if let Some(acnt) = self.acnts.get(&idx) {
            return Ok(acnt.clone());
        }
        let bytes = self
            .read(&keys::account_body(idx))?
            .ok_or(StateError::AccountNotFound(idx))?;
        Ok(Arc::new(decode(&bytes)?))
    }

    /// Resolves an address: cache, persisted index, then overlay accounts.
    pub fn find_account(&self, addr: &Address) -> Result<Option<Arc<Account>>, StateError> {
        let idx = match self.idxs.get(addr) {
            Some(idx) => Some(*idx),
            None => self
                .read(&keys::account_index(addr))?
                .and_then(|b| keys::decode_u64(&b)),
        };
        if let Some(idx) = idx {
            return self.get_account(idx).map(Some);
        }
        Ok(self
            .acnts
            .values()
            .find(|a| a.address() == *addr)
            .cloned())
    }

    /// Looks up the signer of a transaction.
    fn voter(&self, idx: u64) -> Result<Arc<Account>, StateError> {
        self.get_account(idx).map_err(|e| match e {
            StateError::AccountNotFound(_) => StateError::ValidatorNotExists,
            other => other,
        })
    }

    /// Loads `idx` into the overlay and returns it for mutation.
    fn account_mut(&mut self, idx: u64) -> Result<&mut Account, StateError> {
        if !self.acnts.contains_key(&idx) {
            let acnt = self.get_account(idx)?;
            self.acnts.insert(idx, acnt);
        }
        self.modified.entry(idx).or_insert(Dirty::Modified);
        let slot = self
            .acnts
            .get_mut(&idx)
            .ok_or(StateError::AccountNotFound(idx))?;
        Ok(Arc::make_mut(slot))
    }

    fn bump_nonce(&mut self, idx: u64) -> Result<(), StateError> {
        let acnt = self.account_mut(idx)?;
        acnt.nonce += 1;
        Ok(())
    }

    fn insert_new(&mut self, mut acnt: Account) -> u64 {
        let idx = self.header.account_idx;
        self.header.account_idx += 1;
        acnt.index = idx;
        self.idxs.insert(acnt.address(), idx);
        self.acnts.insert(idx, Arc::new(acnt));
        self.modified.insert(idx, Dirty::New);
        idx
    }

    /// Adds a new account under the next index.
    pub fn add_account(&mut self, acnt: Account) -> Result<u64, StateError> {
        if self.find_account(&acnt.address())?.is_some() {
            return Err(StateError::AccountAlreadyExists);
        }
        Ok(self.insert_new(acnt))
    }

    /// Checks signer existence, nonce and signature of `tx`.
    ///
    /// With `allow_nonce_gap` a nonce ahead of the account is accepted, so
    /// a client can queue several transactions.
    pub fn verify(&self, tx: &HacTx, allow_nonce_gap: bool) -> Result<(), StateError> {
        let acnt = self.voter(tx.validator)?;
        let nonce_ok =
            acnt.nonce == tx.nonce || (allow_nonce_gap && acnt.nonce < tx.nonce);
        if !nonce_ok {
            return Err(StateError::NonceInvalid);
        }
        let msg = tx.sig_data(&self.header.chain_id)?;
        if !acnt.verify(&msg, &tx.sig) {
            return Err(StateError::SigInvalid);
        }
        Ok(())
    }

    fn member(&self, idx: u64) -> Result<Arc<Account>, StateError> {
        let acnt = self.voter(idx)?;
        if !acnt.is_member() {
            return Err(StateError::NotMembership);
        }
        Ok(acnt)
    }

    /// Creates a proposal. Returns `None` in check-only mode.
    pub fn proposal(
        &mut self,
        tx: &ProposalTx,
        validator: u64,
        check_only: bool,
        code: Option<VoteCode>,
    ) -> Result<Option<EventProposal>, StateError> {
        let status = match code {
            Some(VoteCode::IgnoreProposal) => ProposalStatus::Ignored,
            Some(VoteCode::ProcessProposal) => ProposalStatus::Processing,
            _ => return Err(StateError::VoteCodeInvalid),
        };
        debug!(validator, height = self.header.height, "apply proposal");
        let acnt = self.member(validator)?;
        if self.mod_proposal.is_some() {
            return Err(StateError::MoreThanOneProposal);
        }
        if tx.title.is_empty() {
            return Err(StateError::EmptyTitle);
        }
        if check_only {
            return Ok(None);
        }

        self.proposal_max += 1;
        let proposal = Proposal {
            index: self.proposal_max,
            proposer: acnt.index,
            proposer_address: acnt.address().to_string(),
            data: tx.data.clone(),
            title: tx.title.clone(),
            link: tx.link.clone(),
            image_url: tx.image_url.clone(),
            end_height: tx.end_height,
            height: self.header.height,
            status,
            settle_height: None,
        };
        let event = EventProposal {
            proposal_index: proposal.index,
            proposer: proposal.proposer,
            proposer_address: proposal.proposer_address.clone(),
            end_height: proposal.end_height,
            status: status.code(),
            data: proposal.data.clone(),
        };
        self.mod_proposal = Some(proposal);
        self.bump_nonce(validator)?;
        Ok(Some(event))
    }

    /// Stored proposal by index.
    pub fn get_proposal(&self, idx: u64) -> Result<Proposal, StateError> {
        if idx == 0 || idx > self.proposal_max {
            return Err(StateError::ProposalNotExists(idx));
        }
        if let Some(p) = self.mod_proposal.as_ref().filter(|p| p.index == idx) {
            return Ok(p.clone());
        }
        let bytes = self
            .read(&keys::proposal_body(idx))?
            .ok_or(StateError::ProposalNotExists(idx))?;
        decode(&bytes)
    }

    /// Stored discussion by index.
    pub fn get_discussion(&self, idx: u64) -> Result<Option<Discussion>, StateError> {
        if let Some(d) = self.new_discussions.get(&idx) {
            return Ok(Some(d.clone()));
        }
        self.read(&keys::discussion_body(idx))?
            .map(|b| decode(&b))
            .transpose()
    }

    /// Settles a processing proposal. Only its proposer may settle it.
    pub fn settle_proposal(
        &mut self,
        tx: &SettleProposalTx,
        validator: u64,
        check_only: bool,
        code: Option<VoteCode>,
    ) -> Result<Option<EventSettleProposal>, StateError> {
        let status = match code {
            Some(VoteCode::AcceptProposal) => ProposalStatus::Accepted,
            Some(VoteCode::RejectProposal) => ProposalStatus::Rejected,
            _ => return Err(StateError::VoteCodeInvalid),
        };
        debug!(validator, height = self.header.height, "apply settle proposal");
        if self.mod_proposal.is_some() {
            return Err(StateError::MoreThanOneProposal);
        }
        self.voter(validator)?;
        let mut proposal = self.get_proposal(tx.proposal)?;
        if proposal.proposer != validator {
            return Err(StateError::NotSettledByProposer);
        }
        if proposal.status != ProposalStatus::Processing {
            return Err(StateError::ProposalNotProcessing(proposal.status));
        }
        if check_only {
            return Ok(None);
        }

        proposal.status = status;
        proposal.settle_height = Some(self.header.height);
        let event = EventSettleProposal {
            proposer: proposal.proposer,
            proposal: proposal.index,
            state: status.code() as i64,
        };
        self.mod_proposal = Some(proposal);
        self.bump_nonce(validator)?;
        Ok(Some(event))
    }

    /// Appends a discussion entry to a proposal.
    pub fn discussion(
        &mut self,
        tx: &DiscussionTx,
        validator: u64,
        check_only: bool,
    ) -> Result<Option<EventDiscussion>, StateError> {
        debug!(validator, height = self.header.height, "apply discussion");
        let acnt = self.member(validator)?;
        if tx.proposal > self.proposal_max {
            return Err(StateError::ProposalNotExists(tx.proposal));
        }
        if check_only {
            return Ok(None);
        }

        self.discussion_max += 1;
        let dis = Discussion {
            index: self.discussion_max,
            proposal: tx.proposal,
            speaker: acnt.index,
            speaker_address: acnt.address().to_string(),
            data: tx.data.clone(),
            height: self.header.height,
        };
        let event = EventDiscussion {
            speaker: dis.speaker,
            speaker_address: dis.speaker_address.clone(),
            proposal: dis.proposal,
            data: dis.data.clone(),
        };
        self.new_discussions.insert(dis.index, dis);
        self.bump_nonce(validator)?;
        Ok(Some(event))
    }

    /// Grant preconditions without touching the state.
    pub fn check_grant(&self, proposer: u64, pubkey: &[u8]) -> Result<Arc<Account>, StateError> {
        let proposer_acnt = self.member(proposer)?;
        let pk = PublicKey::from_slice(pubkey)
            .filter(PublicKey::is_valid)
            .ok_or(StateError::InvalidPubKey)?;
        if self.find_account(&pk.address())?.is_some() {
            return Err(StateError::AccountAlreadyExists);
        }
        Ok(proposer_acnt)
    }

    /// Decides a membership grant.
    ///
    /// Both outcomes consume the next account index, which identifies the
    /// grant. Only `GrantNewMember` creates the account.
    pub fn grant(
        &mut self,
        proposer: u64,
        pubkey: &[u8],
        amount: u64,
        agent_url: &str,
        name: &str,
        code: Option<VoteCode>,
    ) -> Result<EventGrant, StateError> {
        let granted = match code {
            Some(VoteCode::GrantNewMember) => true,
            Some(VoteCode::RejectNewMember) => false,
            _ => return Err(StateError::VoteCodeInvalid),
        };
        let proposer_acnt = self.check_grant(proposer, pubkey)?;
        let pub_key = PublicKey::from_slice(pubkey).ok_or(StateError::InvalidPubKey)?;

        let mut acnt = Account::new(pub_key, amount);
        acnt.agent_url = agent_url.to_string();
        acnt.name = name.to_string();

        let validator = if granted {
            self.insert_new(acnt)
        } else {
            let idx = self.header.account_idx;
            self.header.account_idx += 1;
            idx
        };
        debug!(proposer, validator, granted, "apply grant");
        self.bump_nonce(proposer)?;

        Ok(EventGrant {
            validator,
            address: pub_key.address().to_string(),
            amount,
            agent_url: agent_url.to_string(),
            nonce: 0,
            grant: granted,
            proposer_index: proposer,
            proposer_address: proposer_acnt.address().to_string(),
        })
    }

    /// Retracts the full stake of `validator`.
    pub fn unstake(
        &mut self,
        tx: &RetractTx,
        validator: u64,
        check_only: bool,
    ) -> Result<Option<EventUnStake>, StateError> {
        debug!(validator, amount = tx.amount, height = self.header.height, "apply retract");
        let acnt = self.member(validator)?;
        if acnt.stake != tx.amount {
            return Err(StateError::MustRetractAll);
        }
        if check_only {
            return Ok(None);
        }

        let slot = self.account_mut(validator)?;
        slot.stake -= tx.amount;
        slot.nonce += 1;
        Ok(Some(EventUnStake {
            validator,
            address: acnt.address().to_string(),
            amount: tx.amount,
        }))
    }

    /// Writes the overlay into the store and returns the working app hash.
    ///
    /// Stale pending writes from an abandoned candidate are dropped first.
    /// On failure every write of this call is rolled back.
    pub fn update(&mut self) -> Result<Hash256, StateError> {
        let handle = self.store.clone();
        let mut store = handle.write();
        store.rollback();

        match self.write_overlay(&mut store) {
            Ok(()) => match store.working_hash() {
                Ok(root) => {
                    self.modified.clear();
                    Ok(app_hash(&root))
                }
                Err(e) => {
                    store.rollback();
                    Err(e.into())
                }
            },
            Err(e) => {
                store.rollback();
                Err(e)
            }
        }
    }

    fn write_overlay(&self, store: &mut MerkleStore) -> Result<(), StateError> {
        store.set(keys::KEY_STATE.to_vec(), encode(&self.header)?)?;

        if !self.new_discussions.is_empty() {
            store.set(
                keys::KEY_DISCUSSION_INDEX.to_vec(),
                keys::encode_u64(self.discussion_max),
            )?;
            for (idx, dis) in &self.new_discussions {
                store.set(keys::discussion_body(*idx), encode(dis)?)?;
            }
        }

        if let Some(proposal) = &self.mod_proposal {
            store.set(
                keys::KEY_PROPOSAL_INDEX.to_vec(),
                keys::encode_u64(self.proposal_max),
            )?;
            store.set(keys::proposal_body(proposal.index), encode(proposal)?)?;
        }

        for (idx, flag) in &self.modified {
            let acnt = self
                .acnts
                .get(idx)
                .ok_or(StateError::AccountNotFound(*idx))?;
            store.set(keys::account_body(*idx), encode(acnt.as_ref())?)?;
            if *flag == Dirty::New {
                store.set(keys::account_index(&acnt.address()), keys::encode_u64(*idx))?;
            }
        }
        Ok(())
    }

    /// Persists the store version and records its root in the header.
    pub fn save(&mut self) -> Result<Hash256, StateError> {
        let (root, version) = self.store.write().save_version()?;
        self.header.root_hash = root;
        self.header.hash = app_hash(&root);
        debug!(version, height = self.header.height, hash = %self.header.hash, "state saved");
        Ok(self.header.hash)
    }

    /// Computes the active validator set from stored accounts.
    pub fn validators(&mut self) -> Result<ValidatorSet, StateError> {
        let start = [keys::PREFIX_ACCOUNT_BODY];
        let end = keys::prefix_end(&start);
        let mut accounts = Vec::new();
        for (_, bytes) in self.iterate(&start, end.as_deref())? {
            let acnt: Account = decode(&bytes)?;
            accounts.push((acnt.index, acnt.pub_key, acnt.stake));
        }

        let vals = validators::select(accounts, self.header.height, MAX_VALIDATORS);
        let set = validators::to_set(&vals);
        self.validators = vals;
        Ok(set)
    }

    /// Recomputes the validator set and diffs it against `prev`.
    pub fn validators_update(
        &mut self,
        prev: &ValidatorSet,
    ) -> Result<Vec<ValidatorUpdate>, StateError> {
        let next = self.validators()?;
        Ok(validators::diff(prev, &next))
    }

    /// Last computed validator set, in selection order.
    pub fn validator_set(&self) -> &[ValidatorUpdate] {
        &self.validators
    }

    /// Accounts backing the last computed validator set.
    pub fn validator_accounts(&self) -> Result<Vec<Arc<Account>>, StateError> {
        let mut out = Vec::with_capacity(self.validators.len());
        for val in &self.validators {
            if let Some(acnt) = self.find_account(&val.pub_key.address())? {
                out.push(acnt);
            }
        }
        Ok(out)
    }
}
