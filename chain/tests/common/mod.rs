#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ed25519_dalek::SigningKey;
use hac_chain::consensus::abci::{
    FinalizeBlockRequest, FinalizeBlockResponse, InitChainRequest, PrepareProposalRequest,
    ProcessProposalRequest, ProposalVerdict,
};
use hac_chain::{
    HacApp, HacTx, MemBackend, Oracle, OracleError, Proposal, PublicKey, START_ACCOUNT_INDEX,
    StateDB, StoreBackend, TxPayload, ValidatorUpdate,
};

pub const CHAIN: &str = "hac-it";

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn pubkey(seed: u8) -> PublicKey {
    PublicKey(key(seed).verifying_key().to_bytes())
}

/// Account index of the genesis validator created from `seed`.
pub fn index_of(seed: u8) -> u64 {
    START_ACCOUNT_INDEX + u64::from(seed) - 1
}

pub fn genesis(powers: &[i64]) -> InitChainRequest {
    InitChainRequest {
        chain_id: CHAIN.to_string(),
        validators: powers
            .iter()
            .enumerate()
            .map(|(i, power)| ValidatorUpdate {
                pub_key: pubkey(i as u8 + 1),
                power: *power,
            })
            .collect(),
    }
}

pub fn app_on(backend: Box<dyn StoreBackend>, oracle: Arc<dyn Oracle>) -> HacApp {
    HacApp::new(StateDB::open(backend).unwrap(), oracle)
}

/// In-memory app with one genesis validator per entry of `powers`.
pub fn genesis_app(powers: &[i64], oracle: Arc<dyn Oracle>) -> HacApp {
    let app = app_on(Box::new(MemBackend::new()), oracle);
    app.init_chain(&genesis(powers)).unwrap();
    app
}

/// Signed wire bytes from the genesis account of `seed`.
pub fn signed(seed: u8, nonce: u64, payload: TxPayload) -> Vec<u8> {
    signed_by(&key(seed), index_of(seed), nonce, payload)
}

pub fn signed_by(key: &SigningKey, validator: u64, nonce: u64, payload: TxPayload) -> Vec<u8> {
    let mut tx = HacTx::new(nonce, validator, payload);
    tx.sign(CHAIN, key).unwrap();
    tx.marshal().unwrap()
}

/// Prepares, verifies, finalizes and commits one height.
pub fn run_height(app: &HacApp, txs: Vec<Vec<u8>>) -> (i64, FinalizeBlockResponse) {
    let height = app.info().last_block_height + 1;
    let prepared = app.prepare_proposal(&PrepareProposalRequest { height, txs });
    let verdict = app.process_proposal(&ProcessProposalRequest {
        height,
        txs: prepared.txs.clone(),
    });
    assert_eq!(verdict.status, ProposalVerdict::Accept);
    let res = app
        .finalize_block(&FinalizeBlockRequest {
            height,
            txs: prepared.txs,
            vote_code: verdict.vote_code,
        })
        .unwrap();
    app.commit().unwrap();
    (verdict.vote_code, res)
}

/// Oracle whose answers can be flipped between blocks.
pub struct SwitchOracle {
    pub approve: AtomicBool,
}

impl SwitchOracle {
    pub fn new(approve: bool) -> Arc<Self> {
        Arc::new(Self {
            approve: AtomicBool::new(approve),
        })
    }

    pub fn set(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }

    fn answer(&self) -> Result<bool, OracleError> {
        Ok(self.approve.load(Ordering::SeqCst))
    }
}

impl Oracle for SwitchOracle {
    fn if_process_proposal(&self, _proposer: u64, _data: &[u8]) -> Result<bool, OracleError> {
        self.answer()
    }

    fn if_accept_proposal(&self, _proposal: &Proposal, _voter: &str) -> Result<bool, OracleError> {
        self.answer()
    }

    fn if_grant_new_member(
        &self,
        _grant_id: u64,
        _proposer: &str,
        _amount: u64,
        _statement: &str,
    ) -> Result<bool, OracleError> {
        self.answer()
    }
}
