//! Transfer results as returned to callers.

use fincube_core::{FieldElement, SettlementAddress};
use fincube_ledger::TransferBalances;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorDetail;
use crate::events::AuditStatus;
use crate::state::{TransferState, TransferTrace};

/// Which path a transfer took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferMode {
    IntraOrg,
    CrossOrg,
}

impl TransferMode {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntraOrg => "intra_org",
            Self::CrossOrg => "cross_org",
        }
    }
}

/// The on-chain half of a cross-organization transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainResult {
    pub transaction_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub chain_id: u64,
    pub signer_address: SettlementAddress,
    pub nullifier: FieldElement,
    pub memo: String,
    /// Token base units, as a decimal string.
    pub amount: String,
    /// Whether the audit event was queued or went to the dead-letter
    /// backlog.
    pub audit: AuditStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transfer_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferOutcome {
    /// Same organization: ledger only.
    IntraOrg {
        transfer_id: Uuid,
        ledger: TransferBalances,
    },
    /// Settled on-chain and applied to the ledger.
    CrossOrg {
        transfer_id: Uuid,
        blockchain: BlockchainResult,
        ledger: TransferBalances,
    },
    /// Settled on-chain; the ledger update failed and awaits
    /// reconciliation under `pending_id`.
    Partial {
        transfer_id: Uuid,
        blockchain: BlockchainResult,
        ledger_error: ErrorDetail,
        pending_id: Uuid,
    },
}

impl TransferOutcome {
    pub fn transfer_id(&self) -> Uuid {
        match self {
            Self::IntraOrg { transfer_id, .. }
            | Self::CrossOrg { transfer_id, .. }
            | Self::Partial { transfer_id, .. } => *transfer_id,
        }
    }

    pub fn mode(&self) -> TransferMode {
        match self {
            Self::IntraOrg { .. } => TransferMode::IntraOrg,
            Self::CrossOrg { .. } | Self::Partial { .. } => TransferMode::CrossOrg,
        }
    }

    /// Terminal state of the machine for this outcome.
    pub fn state(&self) -> TransferState {
        match self {
            Self::Partial { .. } => TransferState::Partial,
            _ => TransferState::Done,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }

    pub fn blockchain(&self) -> Option<&BlockchainResult> {
        match self {
            Self::CrossOrg { blockchain, .. } | Self::Partial { blockchain, .. } => {
                Some(blockchain)
            }
            Self::IntraOrg { .. } => None,
        }
    }

    /// Applied balances; `None` for a partial outcome.
    pub fn ledger(&self) -> Option<&TransferBalances> {
        match self {
            Self::IntraOrg { ledger, .. } | Self::CrossOrg { ledger, .. } => Some(ledger),
            Self::Partial { .. } => None,
        }
    }
}

/// Outcome plus the state-machine path that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub outcome: TransferOutcome,
    pub trace: TransferTrace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intra_org_shape() {
        let outcome = TransferOutcome::IntraOrg {
            transfer_id: Uuid::nil(),
            ledger: TransferBalances {
                sender_prev_balance: 10,
                sender_new_balance: 5,
                receiver_prev_balance: 0,
                receiver_new_balance: 5,
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["transfer_type"], "INTRA_ORG");
        assert_eq!(json["ledger"]["sender_new_balance"], 5);
        assert!(outcome.blockchain().is_none());
        assert_eq!(outcome.state(), TransferState::Done);
    }
}
