//! Single-node block production.
//!
//! The engine plays the consensus side of the protocol for a devnet with
//! one validator: it takes a batch from the mempool and walks it through
//! PrepareProposal, ProcessProposal, FinalizeBlock and Commit, then
//! rechecks what is left in the pool.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::abci::{
    CheckTxResponse, ExecTxResult, FinalizeBlockRequest, InitChainRequest,
    PrepareProposalRequest, ProcessProposalRequest, ProposalVerdict,
};
use super::app::HacApp;
use super::config::ConsensusConfig;
use super::mempool::{Mempool, TxPool};
use super::AppError;
use crate::types::{Event, Hash256, ValidatorUpdate};

/// Outcome of one produced block.
#[derive(Clone, Debug)]
pub struct ProducedBlock {
    pub height: u64,
    pub app_hash: Hash256,
    pub vote_code: i64,
    pub tx_results: Vec<ExecTxResult>,
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

pub struct ConsensusEngine {
    pub config: ConsensusConfig,
    app: Arc<HacApp>,
    mempool: Mutex<Mempool>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig, app: Arc<HacApp>) -> Self {
        let mempool = Mutex::new(Mempool::new(config.mempool_capacity));
        Self {
            config,
            app,
            mempool,
        }
    }

    pub fn app(&self) -> &Arc<HacApp> {
        &self.app
    }

    pub fn pending(&self) -> usize {
        self.mempool.lock().len()
    }

    /// Runs InitChain unless the store already holds a chain.
    pub fn ensure_genesis(&self, req: &InitChainRequest) -> Result<bool, AppError> {
        if !self.app.info().last_block_app_hash.is_zero() {
            return Ok(false);
        }
        self.app.init_chain(req)?;
        Ok(true)
    }

    /// Admits `raw` into the mempool if it passes CheckTx.
    pub fn submit(&self, raw: Vec<u8>) -> CheckTxResponse {
        let res = self.app.check_tx(&raw);
        if !res.is_ok() {
            return res;
        }
        if !self.mempool.lock().insert(raw) {
            return CheckTxResponse::rejected("tx already pending or mempool full");
        }
        res
    }

    /// Produces and commits the next block.
    ///
    /// Returns `None` when the mempool is empty and empty blocks are
    /// disabled. A proposal that fails its own verification is replaced
    /// by an empty block; its transactions stay pending.
    pub fn produce_block(&self) -> Result<Option<ProducedBlock>, AppError> {
        let height = self.app.info().last_block_height + 1;
        let offered = self
            .mempool
            .lock()
            .select_for_block(self.config.max_block_txs, self.config.max_block_size_bytes);
        if offered.is_empty() && !self.config.allow_empty_blocks {
            return Ok(None);
        }

        let mut txs = self
            .app
            .prepare_proposal(&PrepareProposalRequest {
                height,
                txs: offered,
            })
            .txs;
        let mut verdict = self.app.process_proposal(&ProcessProposalRequest {
            height,
            txs: txs.clone(),
        });
        if verdict.status != ProposalVerdict::Accept {
            warn!(height, txs = txs.len(), "own proposal rejected, producing empty block");
            txs.clear();
            verdict = self.app.process_proposal(&ProcessProposalRequest {
                height,
                txs: Vec::new(),
            });
        }

        let finalized = self.app.finalize_block(&FinalizeBlockRequest {
            height,
            txs: txs.clone(),
            vote_code: verdict.vote_code,
        })?;
        let committed = self.app.commit()?;

        let app = &self.app;
        self.mempool
            .lock()
            .update(&txs, |raw| app.check_tx(raw).is_ok());

        info!(
            height = committed.height,
            txs = txs.len(),
            app_hash = %committed.app_hash,
            "block produced"
        );
        Ok(Some(ProducedBlock {
            height: committed.height,
            app_hash: committed.app_hash,
            vote_code: verdict.vote_code,
            tx_results: finalized.tx_results,
            validator_updates: finalized.validator_updates,
            events: finalized.events,
        }))
    }
}
