//! # Transfer State Machine
//!
//! ```text
//! VALIDATED ──▶ USERS_RESOLVED ──▶ DB_ONLY ─────────────────────────────┐
//!                      │                                                ▼
//!                      └──▶ PROOF_GENERATED ──▶ NULLIFIER_SET      LEDGER_UPDATED ──▶ DONE
//!                                                    │                  ▲
//!                                                    ▼                  │
//!                                               MEMO_BUILT ──▶ CHAIN_SUBMITTED ──▶ PARTIAL
//!
//! any state before CHAIN_SUBMITTED ──▶ FAILED
//! ```
//!
//! `PARTIAL` is reachable only from `CHAIN_SUBMITTED`: the settlement is
//! on-chain and irreversible but the ledger did not follow.
//!
//! An enum with a checked `advance()` rather than typestates, since the
//! orchestrator drives a single linear path per request and records every
//! step in the trace.

use fincube_core::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Validated,
    UsersResolved,
    DbOnly,
    ProofGenerated,
    NullifierSet,
    MemoBuilt,
    ChainSubmitted,
    LedgerUpdated,
    Done,
    /// Chain settled, ledger update failed.
    Partial,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "VALIDATED",
            Self::UsersResolved => "USERS_RESOLVED",
            Self::DbOnly => "DB_ONLY",
            Self::ProofGenerated => "PROOF_GENERATED",
            Self::NullifierSet => "NULLIFIER_SET",
            Self::MemoBuilt => "MEMO_BUILT",
            Self::ChainSubmitted => "CHAIN_SUBMITTED",
            Self::LedgerUpdated => "LEDGER_UPDATED",
            Self::Done => "DONE",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Partial | Self::Failed)
    }

    /// Whether `self → next` is an edge of the machine.
    pub fn can_advance_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        if next == Failed {
            return !self.is_terminal() && *self != ChainSubmitted;
        }
        matches!(
            (*self, next),
            (Validated, UsersResolved)
                | (UsersResolved, DbOnly)
                | (UsersResolved, ProofGenerated)
                | (DbOnly, LedgerUpdated)
                | (ProofGenerated, NullifierSet)
                | (NullifierSet, MemoBuilt)
                | (MemoBuilt, ChainSubmitted)
                | (ChainSubmitted, LedgerUpdated)
                | (ChainSubmitted, Partial)
                | (LedgerUpdated, Done)
        )
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transfer transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TransferState,
    pub to: TransferState,
}

/// One recorded edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TransferState,
    pub to: TransferState,
    pub at: Timestamp,
}

/// The path a single transfer took through the machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferTrace {
    pub transfer_id: Uuid,
    pub state: TransferState,
    pub transitions: Vec<StateTransition>,
}

impl TransferTrace {
    /// A trace for a request that has just passed validation.
    pub fn new() -> Self {
        Self {
            transfer_id: Uuid::new_v4(),
            state: TransferState::Validated,
            transitions: Vec::new(),
        }
    }

    pub fn advance(&mut self, to: TransferState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(
            transfer_id = %self.transfer_id,
            from = %self.state,
            to = %to,
            "transfer state transition"
        );
        self.transitions.push(StateTransition {
            from: self.state,
            to,
            at: Timestamp::now(),
        });
        self.state = to;
        Ok(())
    }

    /// Move to `FAILED` if the machine allows it from here.
    pub fn fail(&mut self) {
        let _ = self.advance(TransferState::Failed);
    }

    /// States visited, in order, starting with `VALIDATED`.
    pub fn path(&self) -> Vec<TransferState> {
        std::iter::once(TransferState::Validated)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}

impl Default for TransferTrace {
    fn default() -> Self {
        Self::new()
    }
}
