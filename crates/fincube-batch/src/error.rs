//! Batch errors.

use fincube_core::ErrorKind;
use fincube_crypto::CryptoError;
use fincube_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    /// More roots than a batch polynomial can hold.
    #[error("batch capacity exceeded: {requested} roots, maximum {max}")]
    CapacityExceeded {
        /// Roots requested.
        requested: usize,
        /// Batch capacity.
        max: usize,
    },

    /// The open batch was full and a replacement could not be created.
    #[error("batch full and a new batch could not be created: {0}")]
    BatchCreationFailed(#[source] LedgerError),

    /// A stored coefficient vector has the wrong shape.
    #[error("malformed batch {batch_id}: {reason}")]
    MalformedBatch {
        /// Offending batch.
        batch_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The secret is already a root of the open batch.
    #[error("member is already enrolled in batch {0}")]
    AlreadyMember(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl BatchError {
    /// Stable type tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapacityExceeded { .. } | Self::BatchCreationFailed(_) => {
                ErrorKind::CapacityExceeded
            }
            Self::MalformedBatch { .. } => ErrorKind::InternalError,
            Self::AlreadyMember(_) => ErrorKind::InvalidInput,
            Self::Crypto(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
        }
    }
}
