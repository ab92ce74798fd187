//! Pending transaction pool.
//!
//! Consensus does not care how transactions are stored or gossiped; it
//! only needs a batch that fits into a block. Transactions are kept in
//! arrival order and deduplicated by hash.

use std::collections::{HashSet, VecDeque};

use crate::types::Hash256;

/// Abstract transaction pool interface.
pub trait TxPool {
    /// Selects a batch of encoded transactions for inclusion in a block,
    /// oldest first, without removing them.
    ///
    /// `max_txs` and `max_bytes` are soft limits: fewer transactions may
    /// be returned, but the size bound is never exceeded.
    fn select_for_block(&self, max_txs: usize, max_bytes: usize) -> Vec<Vec<u8>>;
}

#[derive(Debug)]
pub struct Mempool {
    txs: VecDeque<(Hash256, Vec<u8>)>,
    known: HashSet<Hash256>,
    capacity: usize,
}

impl Mempool {
    pub fn new(capacity: usize) -> Self {
        Self {
            txs: VecDeque::new(),
            known: HashSet::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Queues `raw`. Returns false if it is already pending or the pool
    /// is full.
    pub fn insert(&mut self, raw: Vec<u8>) -> bool {
        if self.txs.len() >= self.capacity {
            return false;
        }
        let hash = Hash256::compute(&raw);
        if !self.known.insert(hash) {
            return false;
        }
        self.txs.push_back((hash, raw));
        true
    }

    /// Drops the committed transactions, then every remaining one that
    /// no longer passes `recheck`.
    pub fn update<F>(&mut self, committed: &[Vec<u8>], mut recheck: F)
    where
        F: FnMut(&[u8]) -> bool,
    {
        let done: HashSet<Hash256> = committed.iter().map(|raw| Hash256::compute(raw)).collect();
        let known = &mut self.known;
        self.txs.retain(|(hash, raw)| {
            let keep = !done.contains(hash) && recheck(raw);
            if !keep {
                known.remove(hash);
            }
            keep
        });
    }
}

impl TxPool for Mempool {
    fn select_for_block(&self, max_txs: usize, max_bytes: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut bytes = 0usize;
        for (_, raw) in self.txs.iter().take(max_txs) {
            if bytes + raw.len() > max_bytes {
                break;
            }
            bytes += raw.len();
            out.push(raw.clone());
        }
        out
    }
}
