use serde::{Deserialize, Serialize};

/// Block production parameters for the single-node driver.
///
/// Protocol-level knobs (block time) and implementation-level limits
/// (transactions and bytes per block, mempool capacity).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Interval between produced blocks, in milliseconds.
    pub block_time_ms: u64,
    /// Soft limit on the number of transactions per block.
    pub max_block_txs: usize,
    /// Soft limit on the total encoded size of a block's transactions.
    pub max_block_size_bytes: usize,
    /// Whether to produce blocks when the mempool is empty.
    pub allow_empty_blocks: bool,
    /// Maximum number of pending transactions held by the mempool.
    pub mempool_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time_ms: 1_000,
            max_block_txs: 1_000,
            max_block_size_bytes: 1_000_000,
            allow_empty_blocks: true,
            mempool_capacity: 5_000,
        }
    }
}
