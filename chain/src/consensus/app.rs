//! The block-execution application.
//!
//! [`HacApp`] answers the consensus engine's per-height requests. Each
//! block is executed on a fresh candidate [`State`]; FinalizeBlock parks
//! the candidate in a slot and Commit hands it to the [`StateDB`].
//!
//! Mempool checks run on a clone of the committed state with their own
//! handlers, so they never contend with block execution for the handlers'
//! per-block bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::abci::{
    CODE_OK, CheckTxResponse, CommitResponse, ExecTxResult, FinalizeBlockRequest,
    FinalizeBlockResponse, InfoResponse, InitChainRequest, InitChainResponse,
    PrepareProposalRequest, PrepareProposalResponse, ProcessProposalRequest,
    ProcessProposalResponse, ProposalVerdict, QueryRequest, QueryResponse,
};
use super::query::QueryRouter;
use super::vote::block_vote_code;
use super::AppError;
use crate::handler::TxHandlers;
use crate::metrics::MetricsRegistry;
use crate::oracle::Oracle;
use crate::state::validators::{self, units_per_power};
use crate::state::{State, StateDB};
use crate::types::{Account, EventUpdateValidators, HacTx, VoteCode};

struct Executor {
    handlers: TxHandlers,
    /// Finalized block waiting for Commit.
    candidate: Option<State>,
}

pub struct HacApp {
    db: StateDB,
    oracle: Arc<dyn Oracle>,
    checkers: TxHandlers,
    exec: Mutex<Executor>,
    queriers: QueryRouter,
    metrics: Option<MetricsRegistry>,
}

fn decode_all(txs: &[Vec<u8>]) -> Result<Vec<HacTx>, AppError> {
    txs.iter()
        .enumerate()
        .map(|(i, raw)| HacTx::unmarshal(raw).map_err(|e| AppError::at(i, e)))
        .collect()
}

impl HacApp {
    pub fn new(db: StateDB, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            db,
            oracle,
            checkers: TxHandlers::new(),
            exec: Mutex::new(Executor {
                handlers: TxHandlers::new(),
                candidate: None,
            }),
            queriers: QueryRouter::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state_db(&self) -> &StateDB {
        &self.db
    }

    fn count_rejected_tx(&self) {
        if let Some(m) = &self.metrics {
            m.app.txs_rejected.inc();
        }
    }

    /// Creates the genesis accounts, one per validator, and commits them.
    pub fn init_chain(&self, req: &InitChainRequest) -> Result<InitChainResponse, AppError> {
        let mut st = self.db.new_state();
        st.set_chain_id(&req.chain_id);
        for val in &req.validators {
            let power = u64::try_from(val.power)
                .map_err(|_| AppError::InvalidGenesis(format!("negative power {}", val.power)))?;
            let stake = power
                .checked_mul(units_per_power(0))
                .ok_or_else(|| AppError::InvalidGenesis(format!("power {power} overflows")))?;
            st.add_account(Account::new(val.pub_key, stake))
                .inspect_err(|e| error!(error = %e, "init chain add account failed"))?;
        }
        st.update()?;
        st.validators()?;
        let app_hash = self.db.set_state(st)?;
        info!(
            chain_id = %req.chain_id,
            validators = req.validators.len(),
            %app_hash,
            "chain initialised"
        );
        Ok(InitChainResponse { app_hash })
    }

    pub fn info(&self) -> InfoResponse {
        let header = self.db.header();
        InfoResponse {
            last_block_height: header.height,
            last_block_app_hash: header.hash,
        }
    }

    /// Admission check against the committed state. Nonce gaps are
    /// allowed so clients can queue transactions.
    pub fn check_tx(&self, raw: &[u8]) -> CheckTxResponse {
        let mut st = self.db.check_state();
        let res = HacTx::unmarshal(raw)
            .map_err(AppError::from)
            .and_then(|tx| {
                st.verify(&tx, true)?;
                debug!(tx_type = %tx.tx_type(), validator = tx.validator, "check tx");
                self.checkers.get(tx.tx_type()).check(&mut st, &tx)?;
                Ok(())
            });
        match res {
            Ok(()) => CheckTxResponse::default(),
            Err(e) => {
                info!(error = %e, "check tx failed");
                self.count_rejected_tx();
                CheckTxResponse::rejected(e.to_string())
            }
        }
    }

    /// Builds the block body: at most one proposer action, and only the
    /// transactions that apply cleanly in order.
    pub fn prepare_proposal(&self, req: &PrepareProposalRequest) -> PrepareProposalResponse {
        let mut exec = self.exec.lock();
        exec.handlers.new_context();
        let mut st = self.db.new_state();

        // Only transactions whose nonce is next in line are picked, so a
        // queued proposer action cannot hold the block's single slot.
        let mut next_nonce: HashMap<u64, u64> = HashMap::new();
        let mut proposer_act = false;
        let mut picked = Vec::with_capacity(req.txs.len());
        for raw in &req.txs {
            let tx = match HacTx::unmarshal(raw) {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(error = %e, "drop undecodable tx");
                    self.count_rejected_tx();
                    continue;
                }
            };
            let expected = match next_nonce.get(&tx.validator) {
                Some(n) => *n,
                None => match st.get_account(tx.validator) {
                    Ok(acnt) => acnt.nonce,
                    Err(e) => {
                        info!(validator = tx.validator, error = %e, "drop tx from unknown signer");
                        self.count_rejected_tx();
                        continue;
                    }
                },
            };
            if tx.nonce != expected {
                debug!(validator = tx.validator, nonce = tx.nonce, expected, "defer out-of-order tx");
                continue;
            }
            if tx.tx_type().is_proposer_action() {
                if proposer_act {
                    continue;
                }
                if let Err(e) = st.verify(&tx, true) {
                    info!(validator = tx.validator, error = %e, "drop unverifiable proposer action");
                    self.count_rejected_tx();
                    continue;
                }
                proposer_act = true;
            }
            next_nonce.insert(tx.validator, expected + 1);
            picked.push((raw, tx));
        }

        let code = match block_vote_code(&st, picked.iter().map(|(_, tx)| tx), self.oracle.as_ref())
        {
            Ok(code) => code,
            Err(e) => {
                error!(height = req.height, error = %e, "prepare proposal vote code failed");
                return PrepareProposalResponse::default();
            }
        };

        let mut txs = Vec::with_capacity(picked.len());
        for (raw, tx) in picked {
            let mut attempt = st.clone();
            let res = attempt
                .verify(&tx, false)
                .and_then(|_| {
                    exec.handlers
                        .get_mut(tx.tx_type())
                        .prepare(&mut attempt, &tx, code)
                });
            match res {
                Ok(r) if r.code == CODE_OK => {
                    st = attempt;
                    txs.push(raw.clone());
                }
                Ok(r) => {
                    info!(tx_type = %tx.tx_type(), code = r.code, "prepare tx refused");
                    self.count_rejected_tx();
                }
                Err(e) => {
                    info!(tx_type = %tx.tx_type(), error = %e, "prepare tx failed");
                    self.count_rejected_tx();
                }
            }
        }
        debug!(height = req.height, offered = req.txs.len(), kept = txs.len(), "proposal prepared");
        PrepareProposalResponse { txs }
    }

    /// Applies every transaction of `txs` in order; the first failure
    /// aborts the block.
    fn run_block(
        handlers: &mut TxHandlers,
        st: &mut State,
        txs: &[HacTx],
        code: Option<VoteCode>,
    ) -> Result<Vec<ExecTxResult>, AppError> {
        handlers.new_context();
        let mut results = Vec::with_capacity(txs.len());
        for (i, tx) in txs.iter().enumerate() {
            st.verify(tx, false).map_err(|e| AppError::at(i, e))?;
            let res = handlers
                .get_mut(tx.tx_type())
                .process(st, tx, code)
                .map_err(|e| AppError::at(i, e))?;
            results.push(res);
        }
        Ok(results)
    }

    /// Verifies a proposed block by executing it on a throwaway
    /// candidate. Empty blocks are accepted without consulting the oracle.
    pub fn process_proposal(&self, req: &ProcessProposalRequest) -> ProcessProposalResponse {
        if req.txs.is_empty() {
            return ProcessProposalResponse {
                status: ProposalVerdict::Accept,
                vote_code: VoteCode::to_wire(None),
            };
        }

        let mut exec = self.exec.lock();
        let mut st = self.db.new_state();
        let res = decode_all(&req.txs).and_then(|txs| {
            let code = block_vote_code(&st, &txs, self.oracle.as_ref())?;
            Self::run_block(&mut exec.handlers, &mut st, &txs, code)?;
            Ok(code)
        });
        match res {
            Ok(code) => {
                let vote_code = VoteCode::to_wire(code);
                info!(height = req.height, vote_code, "proposal accepted");
                ProcessProposalResponse {
                    status: ProposalVerdict::Accept,
                    vote_code,
                }
            }
            Err(e) => {
                warn!(height = req.height, error = %e, "proposal rejected");
                if let Some(m) = &self.metrics {
                    m.app.blocks_rejected.inc();
                }
                ProcessProposalResponse::default()
            }
        }
    }

    /// Executes the decided block and parks the result for Commit.
    pub fn finalize_block(
        &self,
        req: &FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, AppError> {
        let start = Instant::now();
        let code = match req.vote_code {
            0 => None,
            c => Some(VoteCode::from_code(c).ok_or(AppError::UnknownVoteCode(c))?),
        };

        let mut exec = self.exec.lock();
        let mut st = self.db.new_state();
        if req.height != st.height() {
            return Err(AppError::HeightMismatch {
                expected: st.height(),
                got: req.height,
            });
        }
        let txs = decode_all(&req.txs)?;
        let tx_results = Self::run_block(&mut exec.handlers, &mut st, &txs, code)
            .inspect_err(|e| error!(height = req.height, error = %e, "finalize block failed"))?;

        let prev = validators::to_set(st.validator_set());
        let app_hash = st
            .update()
            .inspect_err(|e| error!(error = %e, "state update failed"))?;
        let validator_updates = st.validators_update(&prev)?;

        let mut events = Vec::new();
        if !validator_updates.is_empty() {
            events.push(
                EventUpdateValidators {
                    updates: validator_updates.clone(),
                }
                .encode(),
            );
        }
        exec.candidate = Some(st);

        if let Some(m) = &self.metrics {
            m.app
                .block_execution_seconds
                .observe(start.elapsed().as_secs_f64());
        }
        info!(
            height = req.height,
            txs = tx_results.len(),
            vote_code = req.vote_code,
            %app_hash,
            validator_updates = validator_updates.len(),
            "block finalized"
        );
        Ok(FinalizeBlockResponse {
            tx_results,
            app_hash,
            validator_updates,
            events,
        })
    }

    /// Persists the finalized block and makes it the committed state.
    pub fn commit(&self) -> Result<CommitResponse, AppError> {
        let mut exec = self.exec.lock();
        let st = exec.candidate.take().ok_or(AppError::NoCandidate)?;
        let height = st.height();
        let app_hash = self.db.set_state(st)?;
        if let Some(m) = &self.metrics {
            m.app.committed_height.set(i64::try_from(height).unwrap_or(i64::MAX));
        }
        debug!(height, %app_hash, "block committed");
        Ok(CommitResponse { height, app_hash })
    }

    pub fn query(&self, req: &QueryRequest) -> QueryResponse {
        self.queriers.route(&self.db, req)
    }
}
