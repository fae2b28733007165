//! # Ledger Records
//!
//! Organizations own batches, batches hold users. A user's organization is
//! reached through its batch, or directly through the settlement address
//! embedded in its reference number.

use fincube_core::{
    BatchId, FieldElement, IdentityKey, OrgId, OrgSalt, ReferenceNumber, SettlementAddress,
    Timestamp, UserId, MAX_BATCH_MEMBERS,
};
use serde::{Deserialize, Serialize};

/// A member organization.
///
/// `org_salt` is fixed at creation and never leaves the engine: it is not a
/// public input and is never sent to the chain or a counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: OrgId,
    pub settlement_address: SettlementAddress,
    pub org_salt: OrgSalt,
    pub created_at: Timestamp,
}

/// A membership batch: a polynomial whose roots are its members' secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub org_id: OrgId,
    /// Exactly `BATCH_COEFFICIENTS` canonical coefficients, lowest degree first.
    pub coefficients: Vec<FieldElement>,
    /// Number of member secrets folded into `coefficients`.
    pub member_count: u32,
    /// Optimistic-concurrency version, bumped on every write.
    pub version: i64,
    pub created_at: Timestamp,
}

impl Batch {
    /// Whether the batch has no room for another member.
    pub fn is_full(&self) -> bool {
        self.member_count as usize >= MAX_BATCH_MEMBERS
    }
}

/// A ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub batch_id: BatchId,
    pub identity_key: IdentityKey,
    /// Whole token units. Never negative.
    pub balance: u64,
    pub reference_number: ReferenceNumber,
    /// Optimistic-concurrency version, bumped on every balance write.
    pub version: i64,
}

/// Insert payload for a user. `user_id` is allocated by the store when absent.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: Option<UserId>,
    pub batch_id: BatchId,
    pub identity_key: IdentityKey,
    pub balance: u64,
    pub reference_number: ReferenceNumber,
}

/// Balances before and after an applied transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBalances {
    pub sender_prev_balance: u64,
    pub sender_new_balance: u64,
    pub receiver_prev_balance: u64,
    pub receiver_new_balance: u64,
}
