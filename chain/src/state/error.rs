use thiserror::Error;

use crate::storage::StorageError;
use crate::types::{ProposalStatus, TxError};

/// Errors raised by the ledger state.
///
/// Variants up to `UnknownHeight` are user-level rejections: they exclude
/// the transaction but never harm the node. The rest indicate a broken
/// store or codec.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("validator noexists")]
    ValidatorNotExists,

    #[error("not membership")]
    NotMembership,

    #[error("nonce invalid")]
    NonceInvalid,

    #[error("signature invalid")]
    SigInvalid,

    #[error("account already exists")]
    AccountAlreadyExists,

    #[error("account noexists")]
    AccountNotFound(u64),

    #[error("proposal noexists")]
    ProposalNotExists(u64),

    #[error("more than one proposal")]
    MoreThanOneProposal,

    #[error("vote code invalid")]
    VoteCodeInvalid,

    #[error("one action in one block")]
    OneActionPerBlock,

    #[error("must retract all")]
    MustRetractAll,

    #[error("proposal not settle by proposer")]
    NotSettledByProposer,

    #[error("proposal not processing status is {0:?}")]
    ProposalNotProcessing(ProposalStatus),

    #[error("proposal title is empty")]
    EmptyTitle,

    #[error("invalid public key")]
    InvalidPubKey,

    #[error("only support one grant in one tx")]
    OnlyOneGrant,

    #[error("no state at height {0}")]
    UnknownHeight(u64),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("encode state: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode state: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl StateError {
    /// True for failures caused by the transaction rather than the node.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            StateError::Storage(_) | StateError::Encode(_) | StateError::Decode(_)
        )
    }
}
