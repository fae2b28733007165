//! Settlement client errors.

use fincube_core::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the on-chain verifier rejected a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailure {
    /// A sumcheck or opening (Shplemini) consistency check failed.
    ConsistencyCheck,
    /// The proof has the wrong length for the verification key.
    ProofLength,
    /// The public-input count does not match the verification key.
    PublicInputsLength,
    /// Any other verifier-internal failure.
    ProtocolInternal,
}

impl VerificationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsistencyCheck => "consistency_check",
            Self::ProofLength => "proof_length",
            Self::PublicInputsLength => "public_inputs_length",
            Self::ProtocolInternal => "protocol_internal",
        }
    }
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The node could not be reached, answered garbage, or timed out.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The verifier rejected the proof.
    #[error("on-chain verification failed ({reason}): {detail}")]
    VerificationFailed {
        reason: VerificationFailure,
        detail: String,
    },

    /// The contract already recorded this nullifier.
    #[error("nullifier {nullifier} already used")]
    NullifierAlreadyUsed { nullifier: String },

    /// The contract or node refused the transaction for another reason.
    #[error("settlement rejected: {0}")]
    Rejected(String),

    /// The transaction was mined but reverted.
    #[error("settlement transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    /// The node accepted the transaction but no receipt arrived before the
    /// deadline. It may still be mined.
    #[error("no receipt for settlement transaction {tx_hash} after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },

    /// The node accepted the transaction, then failed while its receipt was
    /// being polled. It may still be mined.
    #[error("receipt for settlement transaction {tx_hash} unavailable: {reason}")]
    ReceiptUnavailable { tx_hash: String, reason: String },

    /// The client was misconfigured.
    #[error("invalid settlement configuration: {0}")]
    Config(String),
}

impl SettlementError {
    /// Stable type tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_)
            | Self::ReceiptTimeout { .. }
            | Self::ReceiptUnavailable { .. } => ErrorKind::ChainUnavailable,
            Self::VerificationFailed { .. } => ErrorKind::ChainVerificationFailed,
            Self::NullifierAlreadyUsed { .. } => ErrorKind::NullifierAlreadyUsed,
            Self::Rejected(_) | Self::Reverted { .. } => ErrorKind::ChainRejected,
            Self::Config(_) => ErrorKind::InternalError,
        }
    }

    /// Hash of a transaction the node accepted before the failure. Its
    /// on-chain effect must be checked before anything is retried.
    pub fn transaction_hash(&self) -> Option<&str> {
        match self {
            Self::Reverted { tx_hash }
            | Self::ReceiptTimeout { tx_hash, .. }
            | Self::ReceiptUnavailable { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }
}
