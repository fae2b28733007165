//! Ledger store errors.

use fincube_core::ErrorKind;
use thiserror::Error;

/// Failure reported by a [`LedgerStore`](crate::LedgerStore).
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No user with this id or reference number.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No organization with this id or settlement address.
    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    /// No batch with this id.
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    /// A record with the same unique key already exists.
    #[error("{entity} already exists: {key}")]
    Duplicate {
        /// Record type.
        entity: &'static str,
        /// The clashing key.
        key: String,
    },

    /// The sender cannot cover the amount.
    #[error("insufficient balance for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Sending user.
        user_id: i64,
        /// Balance at read time.
        balance: u64,
        /// Requested amount.
        requested: u64,
    },

    /// Sender and receiver are the same account.
    #[error("cannot transfer from user {0} to itself")]
    SameAccount(i64),

    /// Crediting the receiver would overflow its balance.
    #[error("balance overflow crediting user {0}")]
    BalanceOverflow(i64),

    /// A conditional write lost a race: the record changed since it was read.
    #[error("optimistic concurrency conflict on {entity} {key}: expected version {expected}")]
    Conflict {
        /// Record type.
        entity: &'static str,
        /// Record key.
        key: String,
        /// The version the writer read.
        expected: i64,
    },

    /// A stored row does not decode into a valid record.
    #[error("corrupt {entity} record {key}: {reason}")]
    Corrupt {
        /// Record type.
        entity: &'static str,
        /// Record key.
        key: String,
        /// Decode failure.
        reason: String,
    },

    /// The backing database failed or could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

impl LedgerError {
    /// Stable type tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::OrganizationNotFound(_) => ErrorKind::OrganizationNotFound,
            Self::BatchNotFound(_) | Self::Corrupt { .. } => ErrorKind::InternalError,
            Self::Duplicate { .. } | Self::Conflict { .. } => ErrorKind::LedgerConflict,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::SameAccount(_) | Self::BalanceOverflow(_) => ErrorKind::InvalidInput,
            Self::Unavailable(_) => ErrorKind::LedgerUnavailable,
        }
    }
}
