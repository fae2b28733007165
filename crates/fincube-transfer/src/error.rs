//! # Transfer Errors
//!
//! Every failure is wrapped with the [`TransferStage`] it happened in. The
//! underlying error is kept whole, so subprocess output, revert reasons and
//! offending values reach the caller unchanged while `Display` stays a
//! one-line human message.

use fincube_batch::BatchError;
use fincube_core::{ErrorKind, SettlementAddress};
use fincube_crypto::CryptoError;
use fincube_ledger::LedgerError;
use fincube_settlement::{MemoError, SettlementError};
use fincube_zkp::{PipelineError, StageDiagnostics};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::request::RequestError;
use crate::state::InvalidTransition;

/// Where in the orchestration a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Validate,
    ResolveUsers,
    CheckGovernance,
    PrepareProof,
    GenerateProof,
    BindNullifier,
    BuildMemo,
    SubmitChain,
    UpdateLedger,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::ResolveUsers => "resolve_users",
            Self::CheckGovernance => "check_governance",
            Self::PrepareProof => "prepare_proof",
            Self::GenerateProof => "generate_proof",
            Self::BindNullifier => "bind_nullifier",
            Self::BuildMemo => "build_memo",
            Self::SubmitChain => "submit_chain",
            Self::UpdateLedger => "update_ledger",
        }
    }
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum TransferFailure {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("no organization registered for settlement address {0}")]
    OrganizationNotFound(SettlementAddress),

    #[error("user {user_id} has balance {balance}, cannot send {requested}")]
    InsufficientBalance {
        user_id: i64,
        balance: u64,
        requested: u64,
    },

    #[error("organization {0} is not approved by governance")]
    NotApproved(SettlementAddress),

    /// The receiver's secret is not a root of its batch polynomial.
    #[error("receiver {reference} is not a member of batch {batch_id}")]
    NotAMember { reference: String, batch_id: String },

    #[error("amount {amount} does not fit in token base units at {decimals} decimals")]
    AmountOverflow { amount: u64, decimals: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Memo(#[from] MemoError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

impl TransferFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Request(_) | Self::AmountOverflow { .. } => ErrorKind::InvalidInput,
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::OrganizationNotFound(_) => ErrorKind::OrganizationNotFound,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::NotApproved(_) => ErrorKind::ChainRejected,
            Self::NotAMember { .. } => ErrorKind::InputPreparationFailed,
            Self::Ledger(e) => e.kind(),
            Self::Batch(e) => e.kind(),
            Self::Crypto(e) => e.kind(),
            Self::Pipeline(e) => e.kind(),
            Self::Memo(e) => e.kind(),
            Self::Settlement(e) => e.kind(),
            Self::State(_) => ErrorKind::InternalError,
        }
    }
}

/// A failed transfer: what failed, where, and for which request.
#[derive(Error, Debug)]
#[error("transfer failed at {stage}: {failure}")]
pub struct TransferError {
    /// Absent when the request failed validation.
    pub transfer_id: Option<Uuid>,
    pub stage: TransferStage,
    #[source]
    pub failure: TransferFailure,
}

impl TransferError {
    pub fn new(stage: TransferStage, failure: impl Into<TransferFailure>) -> Self {
        Self {
            transfer_id: None,
            stage,
            failure: failure.into(),
        }
    }

    pub(crate) fn with_transfer_id(mut self, id: Uuid) -> Self {
        self.transfer_id = Some(id);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.failure.kind()
    }

    /// Subprocess diagnostics, when a proof stage failed.
    pub fn diagnostics(&self) -> Option<&StageDiagnostics> {
        match &self.failure {
            TransferFailure::Pipeline(e) => e.diagnostics(),
            _ => None,
        }
    }

    /// Hash of a submitted transaction whose outcome is unknown or failed.
    pub fn transaction_hash(&self) -> Option<&str> {
        match &self.failure {
            TransferFailure::Settlement(e) => e.transaction_hash(),
            _ => None,
        }
    }

    /// Serializable view for responses and logs.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            kind: self.kind(),
            stage: Some(self.stage),
            message: self.failure.to_string(),
            transaction_hash: self.transaction_hash().map(str::to_string),
            diagnostics: self.diagnostics().cloned(),
        }
    }
}

/// Caller-facing error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<TransferStage>,
    pub message: String,
    /// Submitted transaction to check on-chain before any retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<StageDiagnostics>,
}

impl ErrorDetail {
    /// Detail for a bare ledger error outside a transfer (reconciliation).
    pub fn from_ledger(error: &LedgerError) -> Self {
        Self {
            kind: error.kind(),
            stage: Some(TransferStage::UpdateLedger),
            message: error.to_string(),
            transaction_hash: None,
            diagnostics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fincube_zkp::ProofStage;

    #[test]
    fn kind_follows_the_wrapped_error() {
        let err = TransferError::new(
            TransferStage::BuildMemo,
            MemoError::TooLong { size: 2000, max: 1024 },
        );
        assert_eq!(err.kind(), ErrorKind::MemoTooLong);
        assert_eq!(
            err.to_string(),
            "transfer failed at build_memo: memo is 2000 bytes, limit is 1024"
        );
    }

    #[test]
    fn diagnostics_are_forwarded() {
        let diag = StageDiagnostics {
            command: vec!["nargo".into(), "execute".into()],
            exit_code: Some(1),
            stderr: "Failed constraint".into(),
            inputs: Some("secret = \"0x01\"".into()),
            ..StageDiagnostics::default()
        };
        let err = TransferError::new(
            TransferStage::GenerateProof,
            PipelineError::StageFailed {
                stage: ProofStage::GenerateWitness,
                diagnostics: Box::new(diag.clone()),
            },
        );
        assert_eq!(err.kind(), ErrorKind::WitnessGenerationFailed);
        let detail = err.detail();
        assert_eq!(detail.diagnostics, Some(diag));
        assert_eq!(detail.stage, Some(TransferStage::GenerateProof));
    }

    #[test]
    fn detail_serializes_tags() {
        let err = TransferError::new(
            TransferStage::Validate,
            RequestError::NonPositiveAmount(0.0),
        );
        let json = serde_json::to_value(err.detail()).unwrap();
        assert_eq!(json["kind"], "InvalidInput");
        assert_eq!(json["stage"], "validate");
        assert!(json.get("diagnostics").is_none());
        assert!(json.get("transaction_hash").is_none());
    }

    #[test]
    fn unconfirmed_submission_carries_its_hash() {
        let err = TransferError::new(
            TransferStage::SubmitChain,
            SettlementError::ReceiptTimeout {
                tx_hash: "0xfeed".into(),
                waited_secs: 120,
            },
        );
        assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
        let detail = err.detail();
        assert_eq!(detail.transaction_hash.as_deref(), Some("0xfeed"));
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["transaction_hash"], "0xfeed");
    }
}
