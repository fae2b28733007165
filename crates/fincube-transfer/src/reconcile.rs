//! # Reconciliation of Partial Settlements
//!
//! A `PARTIAL` transfer moved funds on-chain but left the ledger behind.
//! The orchestrator records the missing balance change here; an operator
//! lists the backlog and re-applies entries. Each `reconcile` call makes
//! exactly one ledger attempt. A failed attempt stays queued with its new
//! error and an incremented attempt count.
//!
//! An entry is claimed under the queue lock before the ledger is touched;
//! a concurrent `reconcile` of the same entry gets
//! [`ReconcileError::InFlight`] and applies nothing.
//!
//! The queue lives in process memory. Entries are logged at `warn` when
//! recorded, and [`ReconciliationQueue::restore`] reloads a backlog that an
//! operator surface persisted from [`ReconciliationQueue::list`].

use std::collections::HashSet;

use fincube_core::{Timestamp, UserId};
use fincube_ledger::{LedgerError, LedgerStore, TransferBalances};
use fincube_settlement::ChainReceipt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorDetail;

/// A ledger transfer that still has to be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLedgerUpdate {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub receipt: ChainReceipt,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: u64,
    /// The most recent ledger failure.
    pub error: ErrorDetail,
    pub recorded_at: Timestamp,
    /// Reconciliation attempts so far.
    pub attempts: u32,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("no pending ledger update {0}")]
    NotFound(Uuid),

    #[error("pending ledger update {0} is already being reconciled")]
    InFlight(Uuid),

    #[error("ledger update {id} still failing: {source}")]
    Ledger {
        id: Uuid,
        #[source]
        source: LedgerError,
    },
}

/// Outcome of a full reconciliation pass.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub applied: Vec<(Uuid, TransferBalances)>,
    pub failed: Vec<(Uuid, ErrorDetail)>,
}

#[derive(Debug, Default)]
struct Backlog {
    entries: Vec<PendingLedgerUpdate>,
    in_flight: HashSet<Uuid>,
}

#[derive(Debug, Default)]
pub struct ReconciliationQueue {
    pending: Mutex<Backlog>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &self,
        transfer_id: Uuid,
        receipt: ChainReceipt,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: u64,
        error: ErrorDetail,
    ) -> Uuid {
        let entry = PendingLedgerUpdate {
            id: Uuid::new_v4(),
            transfer_id,
            receipt,
            from_user_id,
            to_user_id,
            amount,
            error,
            recorded_at: Timestamp::now(),
            attempts: 0,
        };
        tracing::warn!(
            pending_id = %entry.id,
            transfer_id = %transfer_id,
            tx_hash = %entry.receipt.transaction_hash,
            from_user_id = %from_user_id,
            to_user_id = %to_user_id,
            amount,
            "ledger update pending reconciliation"
        );
        let id = entry.id;
        self.pending.lock().entries.push(entry);
        id
    }

    /// A queue holding a previously listed backlog.
    pub fn restore(entries: Vec<PendingLedgerUpdate>) -> Self {
        Self {
            pending: Mutex::new(Backlog {
                entries,
                in_flight: HashSet::new(),
            }),
        }
    }

    /// Snapshot of the backlog, oldest first.
    pub fn list(&self) -> Vec<PendingLedgerUpdate> {
        self.pending.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().entries.is_empty()
    }

    /// Apply one pending update.
    pub async fn reconcile(
        &self,
        ledger: &dyn LedgerStore,
        id: Uuid,
    ) -> Result<TransferBalances, ReconcileError> {
        let entry = {
            let mut pending = self.pending.lock();
            let entry = pending
                .entries
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(ReconcileError::NotFound(id))?;
            if !pending.in_flight.insert(id) {
                return Err(ReconcileError::InFlight(id));
            }
            entry
        };

        let result = ledger
            .apply_transfer(entry.from_user_id, entry.to_user_id, entry.amount)
            .await;

        let mut pending = self.pending.lock();
        pending.in_flight.remove(&id);
        match result {
            Ok(balances) => {
                pending.entries.retain(|e| e.id != id);
                tracing::info!(
                    pending_id = %id,
                    tx_hash = %entry.receipt.transaction_hash,
                    "pending ledger update applied"
                );
                Ok(balances)
            }
            Err(source) => {
                if let Some(e) = pending.entries.iter_mut().find(|e| e.id == id) {
                    e.attempts += 1;
                    e.error = ErrorDetail::from_ledger(&source);
                }
                Err(ReconcileError::Ledger { id, source })
            }
        }
    }

    /// Attempt every pending update once, in order.
    pub async fn reconcile_all(&self, ledger: &dyn LedgerStore) -> ReconcileReport {
        let ids: Vec<Uuid> = self.pending.lock().entries.iter().map(|e| e.id).collect();
        let mut report = ReconcileReport::default();
        for id in ids {
            match self.reconcile(ledger, id).await {
                Ok(balances) => report.applied.push((id, balances)),
                Err(ReconcileError::Ledger { source, .. }) => {
                    report.failed.push((id, ErrorDetail::from_ledger(&source)))
                }
                Err(ReconcileError::NotFound(_) | ReconcileError::InFlight(_)) => {}
            }
        }
        report
    }
}
