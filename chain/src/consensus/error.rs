use thiserror::Error;

use crate::oracle::OracleError;
use crate::state::StateError;
use crate::types::TxError;

/// Errors raised while driving the block-execution protocol.
#[derive(Debug, Error)]
pub enum AppError {
    /// A block carries more than one grant, proposal or settlement.
    #[error("multi proposal in one block")]
    MultiProposalInOneBlock,

    /// A transaction of a block under verification failed to apply.
    #[error("unexpected tx process: tx {index}: {source}")]
    UnexpectedTxProcess {
        index: usize,
        #[source]
        source: Box<AppError>,
    },

    /// FinalizeBlock received a vote code outside the known set.
    #[error("unknown vote code {0}")]
    UnknownVoteCode(i64),

    /// FinalizeBlock names a height other than the next one.
    #[error("height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    /// Commit was called without a finalized candidate.
    #[error("no finalized block to commit")]
    NoCandidate,

    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl AppError {
    pub(crate) fn at(index: usize, source: impl Into<AppError>) -> Self {
        AppError::UnexpectedTxProcess {
            index,
            source: Box::new(source.into()),
        }
    }
}
