//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error taxonomy shared by every crate in the workspace. All
//! errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.
//!
//! ## Design
//!
//! - [`ErrorKind`] is the stable, caller-facing type tag. Tags never change
//!   once published; new failure classes get new tags.
//! - Crate-local error enums carry the diagnostic detail (subprocess output,
//!   offending values) and expose `kind()` to map onto the shared tag.
//! - Validation errors name the offending field and value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable type tag for every failure the engine reports.
///
/// Serialized with the variant name (`"InvalidInput"`, `"LedgerConflict"`, ...)
/// so the tag doubles as the wire representation in transfer responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Request failed validation before any side effect.
    InvalidInput,
    /// Sender or receiver user does not exist.
    UserNotFound,
    /// No organization is registered for a settlement address.
    OrganizationNotFound,
    /// Sender balance is lower than the requested amount.
    InsufficientBalance,
    /// Batch is full and a replacement batch could not be created.
    CapacityExceeded,
    /// Prover inputs could not be serialized or staged.
    InputPreparationFailed,
    /// Circuit compilation failed.
    CompilationFailed,
    /// Witness generation failed.
    WitnessGenerationFailed,
    /// Verification-key or proof generation failed.
    ProofGenerationFailed,
    /// An expected proof artifact is missing or empty.
    ArtifactValidationFailed,
    /// Raw proof bytes could not be shaped for the settlement contract.
    ProofFormatFailed,
    /// Encoded settlement memo exceeds the size limit.
    MemoTooLong,
    /// The on-chain verifier rejected the proof.
    ChainVerificationFailed,
    /// The nullifier was already recorded on-chain.
    NullifierAlreadyUsed,
    /// The chain node could not be reached or did not answer in time.
    ChainUnavailable,
    /// The settlement contract rejected the transaction for another reason.
    ChainRejected,
    /// Optimistic-concurrency check failed in the ledger.
    LedgerConflict,
    /// The ledger store could not be reached.
    LedgerUnavailable,
    /// Invariant violation inside the engine.
    InternalError,
}

impl ErrorKind {
    /// The stable string tag for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::UserNotFound => "UserNotFound",
            Self::OrganizationNotFound => "OrganizationNotFound",
            Self::InsufficientBalance => "InsufficientBalance",
            Self::CapacityExceeded => "CapacityExceeded",
            Self::InputPreparationFailed => "InputPreparationFailed",
            Self::CompilationFailed => "CompilationFailed",
            Self::WitnessGenerationFailed => "WitnessGenerationFailed",
            Self::ProofGenerationFailed => "ProofGenerationFailed",
            Self::ArtifactValidationFailed => "ArtifactValidationFailed",
            Self::ProofFormatFailed => "ProofFormatFailed",
            Self::MemoTooLong => "MemoTooLong",
            Self::ChainVerificationFailed => "ChainVerificationFailed",
            Self::NullifierAlreadyUsed => "NullifierAlreadyUsed",
            Self::ChainUnavailable => "ChainUnavailable",
            Self::ChainRejected => "ChainRejected",
            Self::LedgerConflict => "LedgerConflict",
            Self::LedgerUnavailable => "LedgerUnavailable",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value failed format validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A settlement address is not `0x` followed by 40 hex digits.
    #[error("invalid settlement address {0:?}: expected 0x followed by 40 hex digits")]
    InvalidAddress(String),

    /// A reference number is not `<address>_<suffix>`.
    #[error("invalid reference number {value:?}: {reason}")]
    InvalidReference {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A user identifier is not a positive integer.
    #[error("invalid user id {0}: must be a positive integer")]
    InvalidUserId(i64),

    /// A required string field was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// An organization salt is not 32 bytes of hex.
    #[error("invalid organization salt: {0}")]
    InvalidSalt(String),

    /// A timestamp is not RFC 3339 UTC.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors converting external data into canonical field elements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The hex string is malformed.
    #[error("invalid hex field element {value:?}: {reason}")]
    InvalidHex {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The decimal string is malformed.
    #[error("invalid decimal field element {0:?}")]
    InvalidDecimal(String),

    /// The encoding is well-formed but not reduced modulo the field prime.
    #[error("non-canonical field element {0}: value is not below the field modulus")]
    NonCanonical(String),

    /// A byte slice had the wrong length.
    #[error("field element must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be strings or integers.
    #[error("float values are not permitted in canonical representations; use string or integer for amount: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
