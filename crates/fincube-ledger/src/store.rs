//! # Ledger Store Trait
//!
//! The seam between the engine and its persistence. Implementations must
//! honour the optimistic-concurrency contract: conditional writes keyed on
//! the version the caller read, `Conflict` on mismatch, no internal retry.
//!
//! No method holds a lock or an open transaction after it returns, so
//! callers may freely await proof or chain work between calls.

use async_trait::async_trait;
use fincube_core::{BatchId, OrgId, ReferenceNumber, SettlementAddress, UserId};

use crate::error::LedgerError;
use crate::records::{Batch, NewUser, Organization, TransferBalances, User};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new organization. `Duplicate` if its id or settlement
    /// address is taken.
    async fn create_organization(&self, org: &Organization) -> Result<(), LedgerError>;

    /// Look up an organization by id.
    async fn get_organization(&self, org_id: &OrgId) -> Result<Option<Organization>, LedgerError>;

    /// Look up the organization owning a settlement address.
    async fn get_organization_by_address(
        &self,
        address: &SettlementAddress,
    ) -> Result<Option<Organization>, LedgerError>;

    /// Persist a new batch at version 0.
    async fn create_batch(&self, batch: &Batch) -> Result<(), LedgerError>;

    /// Look up a batch by id.
    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<Batch>, LedgerError>;

    /// The organization's most recently created batch, if any.
    async fn latest_batch(&self, org_id: &OrgId) -> Result<Option<Batch>, LedgerError>;

    /// Replace a batch's coefficients and member count if its stored version
    /// still equals `batch.version`. Returns the batch at its new version.
    async fn update_batch(&self, batch: &Batch) -> Result<Batch, LedgerError>;

    /// Persist a new user at version 0.
    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError>;

    /// `update_batch` and `insert_user` as one atomic step: the batch write
    /// carries the same version condition, and if either write fails
    /// neither is kept. Used to claim a batch slot for a new member.
    async fn update_batch_with_user(
        &self,
        batch: &Batch,
        user: NewUser,
    ) -> Result<(Batch, User), LedgerError>;

    /// Look up a user by id.
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, LedgerError>;

    /// Look up a user by its public reference number.
    async fn get_user_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<User>, LedgerError>;

    /// Move `amount` from `from` to `to`.
    ///
    /// Reads both balances with their versions, then writes both
    /// conditionally in one atomic step. Either both balances change or
    /// neither does.
    async fn apply_transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: u64,
    ) -> Result<TransferBalances, LedgerError>;
}

/// Compute post-transfer balances, or the reason the transfer is impossible.
pub(crate) fn plan_transfer(
    sender: &User,
    receiver: &User,
    amount: u64,
) -> Result<TransferBalances, LedgerError> {
    if sender.user_id == receiver.user_id {
        return Err(LedgerError::SameAccount(sender.user_id.get()));
    }
    let sender_new_balance =
        sender
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                user_id: sender.user_id.get(),
                balance: sender.balance,
                requested: amount,
            })?;
    let receiver_new_balance = receiver
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow(receiver.user_id.get()))?;
    Ok(TransferBalances {
        sender_prev_balance: sender.balance,
        sender_new_balance,
        receiver_prev_balance: receiver.balance,
        receiver_new_balance,
    })
}
