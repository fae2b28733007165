//! # Batch Manager
//!
//! Registers organizations and assigns members to batches.
//!
//! ## Atomicity
//!
//! Assignment claims a slot in the organization's open batch, creating a
//! fresh batch first when the open one is full. Two layers keep concurrent
//! joins from colliding:
//!
//! - a per-organization async mutex serialises assignments inside this
//!   process, so two tasks never both see the last free slot;
//! - the batch write is conditional on the version that was read, so a
//!   second process racing on the same batch gets `LedgerConflict` instead
//!   of overwriting a root. The caller decides whether to retry.
//!
//! [`BatchManager::enroll`] writes the claimed slot and the new user in one
//! store operation, so a rejected user never leaves an orphaned root behind.

use std::sync::Arc;

use dashmap::DashMap;
use fincube_core::{
    BatchId, FieldElement, IdentityKey, OrgId, OrgSalt, ReferenceNumber, SettlementAddress,
    Timestamp, UserId,
};
use fincube_crypto::derive_secret;
use fincube_ledger::{Batch, LedgerStore, NewUser, Organization, User};
use tokio::sync::Mutex;

use crate::error::BatchError;
use crate::polynomial::{build_polynomial, extend_polynomial, is_root};

/// Result of placing a member into a batch.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The batch after the member's root was folded in.
    pub batch: Batch,
    /// The member's secret. Not persisted.
    pub secret: FieldElement,
}

/// A member assigned to a batch and recorded as a ledger user.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub user: User,
    pub batch: Batch,
}

/// Owns batch lifecycle for every organization in a ledger.
pub struct BatchManager {
    ledger: Arc<dyn LedgerStore>,
    org_locks: DashMap<OrgId, Arc<Mutex<()>>>,
}

impl BatchManager {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            org_locks: DashMap::new(),
        }
    }

    /// Create an organization with a fresh random salt and its first,
    /// empty batch.
    pub async fn register_organization(
        &self,
        settlement_address: SettlementAddress,
    ) -> Result<Organization, BatchError> {
        let org = Organization {
            org_id: OrgId::new(),
            settlement_address,
            org_salt: OrgSalt::generate(),
            created_at: Timestamp::now(),
        };
        self.ledger.create_organization(&org).await?;
        let batch = self.create_empty_batch(&org.org_id).await?;
        tracing::info!(
            org_id = %org.org_id,
            address = %org.settlement_address,
            batch_id = %batch.batch_id,
            "organization registered"
        );
        Ok(org)
    }

    /// Assign the member identified by `identity_key` to the organization's
    /// open batch, rolling over to a new batch when the open one is full.
    pub async fn assign_user(
        &self,
        org: &Organization,
        identity_key: &IdentityKey,
    ) -> Result<Assignment, BatchError> {
        let lock = self.org_lock(&org.org_id);
        let _guard = lock.lock().await;

        let (batch, secret) = self.claim_slot(org, identity_key).await?;
        let batch = self.ledger.update_batch(&batch).await?;
        log_assignment(org, &batch);
        Ok(Assignment { batch, secret })
    }

    /// Assign a member and record it as a ledger user with a fresh
    /// reference number. The slot and the user are written together.
    pub async fn enroll(
        &self,
        org: &Organization,
        identity_key: IdentityKey,
        user_id: Option<UserId>,
        opening_balance: u64,
    ) -> Result<Enrollment, BatchError> {
        let lock = self.org_lock(&org.org_id);
        let _guard = lock.lock().await;

        let (batch, _secret) = self.claim_slot(org, &identity_key).await?;
        let (batch, user) = self
            .ledger
            .update_batch_with_user(
                &batch,
                NewUser {
                    user_id,
                    batch_id: batch.batch_id,
                    identity_key,
                    balance: opening_balance,
                    reference_number: ReferenceNumber::generate(&org.settlement_address),
                },
            )
            .await?;
        log_assignment(org, &batch);
        Ok(Enrollment { user, batch })
    }

    fn org_lock(&self, org_id: &OrgId) -> Arc<Mutex<()>> {
        self.org_locks
            .entry(*org_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The open batch with the member's root folded in, not yet written.
    /// Must run under the organization's lock.
    async fn claim_slot(
        &self,
        org: &Organization,
        identity_key: &IdentityKey,
    ) -> Result<(Batch, FieldElement), BatchError> {
        let mut batch = match self.ledger.latest_batch(&org.org_id).await? {
            Some(batch) if !batch.is_full() => batch,
            Some(full) => {
                let batch = self
                    .create_empty_batch(&org.org_id)
                    .await
                    .map_err(|e| match e {
                        BatchError::Ledger(inner) => BatchError::BatchCreationFailed(inner),
                        other => other,
                    })?;
                tracing::info!(
                    org_id = %org.org_id,
                    full_batch = %full.batch_id,
                    batch_id = %batch.batch_id,
                    "batch full, rolled over"
                );
                batch
            }
            None => self.create_empty_batch(&org.org_id).await?,
        };

        let secret = derive_secret(identity_key, &org.org_salt);
        if batch.member_count > 0 && is_root(&batch.coefficients, &secret) {
            return Err(BatchError::AlreadyMember(batch.batch_id.to_string()));
        }

        batch.coefficients =
            extend_polynomial(&batch.coefficients, &secret).map_err(|e| match e {
                BatchError::MalformedBatch { reason, .. } => BatchError::MalformedBatch {
                    batch_id: batch.batch_id.to_string(),
                    reason,
                },
                other => other,
            })?;
        batch.member_count += 1;
        Ok((batch, secret))
    }

    async fn create_empty_batch(&self, org_id: &OrgId) -> Result<Batch, BatchError> {
        let batch = Batch {
            batch_id: BatchId::new(),
            org_id: *org_id,
            coefficients: build_polynomial(&[])?,
            member_count: 0,
            version: 0,
            created_at: Timestamp::now(),
        };
        self.ledger.create_batch(&batch).await?;
        Ok(batch)
    }
}

fn log_assignment(org: &Organization, batch: &Batch) {
    tracing::debug!(
        org_id = %org.org_id,
        batch_id = %batch.batch_id,
        member_count = batch.member_count,
        "member assigned"
    );
}
