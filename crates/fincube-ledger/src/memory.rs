//! # In-Memory Ledger
//!
//! A [`LedgerStore`] over `parking_lot` maps. Writes follow the same
//! read-then-conditional-write protocol as the PostgreSQL store, so races
//! between concurrent transfers surface as `Conflict` here too.

use std::collections::HashMap;

use async_trait::async_trait;
use fincube_core::{BatchId, OrgId, ReferenceNumber, SettlementAddress, UserId};
use parking_lot::RwLock;

use crate::error::LedgerError;
use crate::records::{Batch, NewUser, Organization, TransferBalances, User};
use crate::store::{plan_transfer, LedgerStore};

#[derive(Default)]
struct Tables {
    organizations: HashMap<OrgId, Organization>,
    org_by_address: HashMap<SettlementAddress, OrgId>,
    batches: HashMap<BatchId, Batch>,
    /// Batch ids per organization in creation order.
    org_batches: HashMap<OrgId, Vec<BatchId>>,
    users: HashMap<UserId, User>,
    user_by_reference: HashMap<ReferenceNumber, UserId>,
    last_user_id: i64,
}

impl Tables {
    fn check_batch_write(&self, batch: &Batch) -> Result<(), LedgerError> {
        let stored = self
            .batches
            .get(&batch.batch_id)
            .ok_or_else(|| LedgerError::BatchNotFound(batch.batch_id.to_string()))?;
        if stored.version != batch.version {
            return Err(LedgerError::Conflict {
                entity: "batch",
                key: batch.batch_id.to_string(),
                expected: batch.version,
            });
        }
        Ok(())
    }

    /// Caller has run `check_batch_write`.
    fn write_batch(&mut self, batch: &Batch) -> Batch {
        let stored = self
            .batches
            .entry(batch.batch_id)
            .or_insert_with(|| batch.clone());
        stored.coefficients = batch.coefficients.clone();
        stored.member_count = batch.member_count;
        stored.version += 1;
        stored.clone()
    }

    /// The id the user will be stored under, or why it cannot be inserted.
    fn check_new_user(&self, user: &NewUser) -> Result<UserId, LedgerError> {
        if !self.batches.contains_key(&user.batch_id) {
            return Err(LedgerError::BatchNotFound(user.batch_id.to_string()));
        }
        if self.user_by_reference.contains_key(&user.reference_number) {
            return Err(LedgerError::Duplicate {
                entity: "user",
                key: user.reference_number.to_string(),
            });
        }
        let user_id = match user.user_id {
            Some(id) => id,
            None => {
                let next = self.last_user_id + 1;
                UserId::new(next).map_err(|e| LedgerError::Corrupt {
                    entity: "user",
                    key: next.to_string(),
                    reason: e.to_string(),
                })?
            }
        };
        if self.users.contains_key(&user_id) {
            return Err(LedgerError::Duplicate {
                entity: "user",
                key: user_id.to_string(),
            });
        }
        Ok(user_id)
    }

    /// Caller has run `check_new_user`.
    fn write_user(&mut self, user_id: UserId, user: NewUser) -> User {
        self.last_user_id = self.last_user_id.max(user_id.get());
        let stored = User {
            user_id,
            batch_id: user.batch_id,
            identity_key: user.identity_key,
            balance: user.balance,
            reference_number: user.reference_number,
            version: 0,
        };
        self.user_by_reference
            .insert(stored.reference_number.clone(), user_id);
        self.users.insert(user_id, stored.clone());
        stored
    }
}

/// Process-local ledger.
#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_organization(&self, org: &Organization) -> Result<(), LedgerError> {
        let mut t = self.tables.write();
        if t.organizations.contains_key(&org.org_id) {
            return Err(LedgerError::Duplicate {
                entity: "organization",
                key: org.org_id.to_string(),
            });
        }
        if t.org_by_address.contains_key(&org.settlement_address) {
            return Err(LedgerError::Duplicate {
                entity: "organization",
                key: org.settlement_address.to_string(),
            });
        }
        t.org_by_address
            .insert(org.settlement_address.clone(), org.org_id);
        t.organizations.insert(org.org_id, org.clone());
        Ok(())
    }

    async fn get_organization(&self, org_id: &OrgId) -> Result<Option<Organization>, LedgerError> {
        Ok(self.tables.read().organizations.get(org_id).cloned())
    }

    async fn get_organization_by_address(
        &self,
        address: &SettlementAddress,
    ) -> Result<Option<Organization>, LedgerError> {
        let t = self.tables.read();
        Ok(t.org_by_address
            .get(address)
            .and_then(|id| t.organizations.get(id))
            .cloned())
    }

    async fn create_batch(&self, batch: &Batch) -> Result<(), LedgerError> {
        let mut t = self.tables.write();
        if !t.organizations.contains_key(&batch.org_id) {
            return Err(LedgerError::OrganizationNotFound(batch.org_id.to_string()));
        }
        if t.batches.contains_key(&batch.batch_id) {
            return Err(LedgerError::Duplicate {
                entity: "batch",
                key: batch.batch_id.to_string(),
            });
        }
        let mut stored = batch.clone();
        stored.version = 0;
        t.org_batches
            .entry(batch.org_id)
            .or_default()
            .push(batch.batch_id);
        t.batches.insert(batch.batch_id, stored);
        Ok(())
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<Batch>, LedgerError> {
        Ok(self.tables.read().batches.get(batch_id).cloned())
    }

    async fn latest_batch(&self, org_id: &OrgId) -> Result<Option<Batch>, LedgerError> {
        let t = self.tables.read();
        Ok(t.org_batches
            .get(org_id)
            .and_then(|ids| ids.last())
            .and_then(|id| t.batches.get(id))
            .cloned())
    }

    async fn update_batch(&self, batch: &Batch) -> Result<Batch, LedgerError> {
        let mut t = self.tables.write();
        t.check_batch_write(batch)?;
        Ok(t.write_batch(batch))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError> {
        let mut t = self.tables.write();
        let user_id = t.check_new_user(&user)?;
        Ok(t.write_user(user_id, user))
    }

    async fn update_batch_with_user(
        &self,
        batch: &Batch,
        user: NewUser,
    ) -> Result<(Batch, User), LedgerError> {
        let mut t = self.tables.write();
        t.check_batch_write(batch)?;
        let user_id = t.check_new_user(&user)?;
        let batch = t.write_batch(batch);
        let user = t.write_user(user_id, user);
        Ok((batch, user))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, LedgerError> {
        Ok(self.tables.read().users.get(&user_id).cloned())
    }

    async fn get_user_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<User>, LedgerError> {
        let t = self.tables.read();
        Ok(t.user_by_reference
            .get(reference)
            .and_then(|id| t.users.get(id))
            .cloned())
    }

    async fn apply_transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: u64,
    ) -> Result<TransferBalances, LedgerError> {
        // Read phase.
        let (sender, receiver) = {
            let t = self.tables.read();
            let sender = t
                .users
                .get(&from)
                .cloned()
                .ok_or_else(|| LedgerError::UserNotFound(from.to_string()))?;
            let receiver = t
                .users
                .get(&to)
                .cloned()
                .ok_or_else(|| LedgerError::UserNotFound(to.to_string()))?;
            (sender, receiver)
        };
        let plan = plan_transfer(&sender, &receiver, amount)?;

        // Conditional write phase.
        let mut t = self.tables.write();
        for expected in [&sender, &receiver] {
            let current = t.users.get(&expected.user_id).map(|u| u.version);
            if current != Some(expected.version) {
                return Err(LedgerError::Conflict {
                    entity: "user",
                    key: expected.user_id.to_string(),
                    expected: expected.version,
                });
            }
        }
        if let Some(u) = t.users.get_mut(&from) {
            u.balance = plan.sender_new_balance;
            u.version += 1;
        }
        if let Some(u) = t.users.get_mut(&to) {
            u.balance = plan.receiver_new_balance;
            u.version += 1;
        }
        Ok(plan)
    }
}
