//! # PostgreSQL Ledger
//!
//! [`LedgerStore`] over SQLx. Balance and batch writes are conditional
//! `UPDATE ... WHERE version = $n`; zero affected rows means the row moved
//! under us and is reported as `Conflict`. Transactions only wrap the
//! statements of one call and are committed or dropped before returning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fincube_core::{
    BatchId, FieldElement, IdentityKey, OrgId, OrgSalt, ReferenceNumber, SettlementAddress,
    Timestamp, UserId,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::records::{Batch, NewUser, Organization, TransferBalances, User};
use crate::store::{plan_transfer, LedgerStore};

/// Connect to PostgreSQL and run the embedded migrations.
///
/// Returns `None` if `database_url` is `None` (in-memory mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, LedgerError> {
    let url = match database_url {
        Some(url) => url,
        None => {
            tracing::warn!("no database URL configured; using the in-memory ledger");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| LedgerError::Unavailable(e.into()))?;
    tracing::info!("ledger migrations applied");

    Ok(Some(pool))
}

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique(err: sqlx::Error, entity: &'static str, key: String) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LedgerError::Duplicate { entity, key }
        }
        _ => LedgerError::Unavailable(err),
    }
}

fn balance_to_db(user_id: i64, balance: u64) -> Result<i64, LedgerError> {
    i64::try_from(balance).map_err(|_| LedgerError::BalanceOverflow(user_id))
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    org_id: Uuid,
    settlement_address: String,
    org_salt: String,
    created_at: DateTime<Utc>,
}

impl OrganizationRow {
    fn into_record(self) -> Result<Organization, LedgerError> {
        let corrupt = |reason: String| LedgerError::Corrupt {
            entity: "organization",
            key: self.org_id.to_string(),
            reason,
        };
        Ok(Organization {
            org_id: OrgId::from_uuid(self.org_id),
            settlement_address: SettlementAddress::new(&self.settlement_address)
                .map_err(|e| corrupt(e.to_string()))?,
            org_salt: OrgSalt::new(&self.org_salt).map_err(|e| corrupt(e.to_string()))?,
            created_at: Timestamp::from_utc(self.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    batch_id: Uuid,
    org_id: Uuid,
    coefficients: Vec<String>,
    member_count: i32,
    version: i64,
    created_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_record(self) -> Result<Batch, LedgerError> {
        let key = self.batch_id.to_string();
        let coefficients = self
            .coefficients
            .iter()
            .map(|c| FieldElement::from_hex(c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::Corrupt {
                entity: "batch",
                key: key.clone(),
                reason: e.to_string(),
            })?;
        let member_count = u32::try_from(self.member_count).map_err(|_| LedgerError::Corrupt {
            entity: "batch",
            key,
            reason: format!("negative member count {}", self.member_count),
        })?;
        Ok(Batch {
            batch_id: BatchId::from_uuid(self.batch_id),
            org_id: OrgId::from_uuid(self.org_id),
            coefficients,
            member_count,
            version: self.version,
            created_at: Timestamp::from_utc(self.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    batch_id: Uuid,
    identity_key: String,
    balance: i64,
    reference_number: String,
    version: i64,
}

impl UserRow {
    fn into_record(self) -> Result<User, LedgerError> {
        let corrupt = |reason: String| LedgerError::Corrupt {
            entity: "user",
            key: self.user_id.to_string(),
            reason,
        };
        Ok(User {
            user_id: UserId::new(self.user_id).map_err(|e| corrupt(e.to_string()))?,
            batch_id: BatchId::from_uuid(self.batch_id),
            identity_key: IdentityKey::new(self.identity_key.clone())
                .map_err(|e| corrupt(e.to_string()))?,
            balance: u64::try_from(self.balance)
                .map_err(|_| corrupt(format!("negative balance {}", self.balance)))?,
            reference_number: ReferenceNumber::new(self.reference_number.clone())
                .map_err(|e| corrupt(e.to_string()))?,
            version: self.version,
        })
    }
}

const USER_COLUMNS: &str = "user_id, batch_id, identity_key, balance, reference_number, version";
const BATCH_COLUMNS: &str = "batch_id, org_id, coefficients, member_count, version, created_at";

fn coefficients_to_db(batch: &Batch) -> Vec<String> {
    batch.coefficients.iter().map(FieldElement::to_hex).collect()
}

async fn update_batch_on(conn: &mut PgConnection, batch: &Batch) -> Result<Batch, LedgerError> {
    let member_count = i32::try_from(batch.member_count).map_err(|_| LedgerError::Corrupt {
        entity: "batch",
        key: batch.batch_id.to_string(),
        reason: "member count out of range".to_string(),
    })?;
    let row = sqlx::query_as::<_, BatchRow>(&format!(
        "UPDATE batches SET coefficients = $1, member_count = $2, version = version + 1
         WHERE batch_id = $3 AND version = $4
         RETURNING {BATCH_COLUMNS}"
    ))
    .bind(coefficients_to_db(batch))
    .bind(member_count)
    .bind(batch.batch_id.as_uuid())
    .bind(batch.version)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row.into_record(),
        None => Err(LedgerError::Conflict {
            entity: "batch",
            key: batch.batch_id.to_string(),
            expected: batch.version,
        }),
    }
}

/// Insert a user inside an open transaction.
async fn insert_user_on(conn: &mut PgConnection, user: NewUser) -> Result<User, LedgerError> {
    let reference = user.reference_number.to_string();
    let balance = balance_to_db(user.user_id.map_or(0, |id| id.get()), user.balance)?;
    let row = match user.user_id {
        Some(id) => {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "INSERT INTO users (user_id, batch_id, identity_key, balance, reference_number)
                 VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
            ))
            .bind(id.get())
            .bind(user.batch_id.as_uuid())
            .bind(user.identity_key.expose())
            .bind(balance)
            .bind(&reference)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_unique(e, "user", reference.clone()))?;
            // Keep the serial ahead of explicitly chosen ids.
            sqlx::query(
                "SELECT setval(pg_get_serial_sequence('users', 'user_id'),
                               GREATEST((SELECT MAX(user_id) FROM users), 1))",
            )
            .execute(&mut *conn)
            .await?;
            row
        }
        None => sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (batch_id, identity_key, balance, reference_number)
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.batch_id.as_uuid())
        .bind(user.identity_key.expose())
        .bind(balance)
        .bind(&reference)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_unique(e, "user", reference.clone()))?,
    };
    row.into_record()
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn create_organization(&self, org: &Organization) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO organizations (org_id, settlement_address, org_salt, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(org.org_id.as_uuid())
        .bind(org.settlement_address.as_str())
        .bind(org.org_salt.expose())
        .bind(org.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "organization", org.settlement_address.to_string()))?;
        Ok(())
    }

    async fn get_organization(&self, org_id: &OrgId) -> Result<Option<Organization>, LedgerError> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT org_id, settlement_address, org_salt, created_at
             FROM organizations WHERE org_id = $1",
        )
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrganizationRow::into_record).transpose()
    }

    async fn get_organization_by_address(
        &self,
        address: &SettlementAddress,
    ) -> Result<Option<Organization>, LedgerError> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT org_id, settlement_address, org_salt, created_at
             FROM organizations WHERE settlement_address = $1",
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrganizationRow::into_record).transpose()
    }

    async fn create_batch(&self, batch: &Batch) -> Result<(), LedgerError> {
        let member_count = i32::try_from(batch.member_count).map_err(|_| LedgerError::Corrupt {
            entity: "batch",
            key: batch.batch_id.to_string(),
            reason: "member count out of range".to_string(),
        })?;
        sqlx::query(
            "INSERT INTO batches (batch_id, org_id, coefficients, member_count, version, created_at)
             VALUES ($1, $2, $3, $4, 0, $5)",
        )
        .bind(batch.batch_id.as_uuid())
        .bind(batch.org_id.as_uuid())
        .bind(coefficients_to_db(batch))
        .bind(member_count)
        .bind(batch.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "batch", batch.batch_id.to_string()))?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<Batch>, LedgerError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE batch_id = $1"
        ))
        .bind(batch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(BatchRow::into_record).transpose()
    }

    async fn latest_batch(&self, org_id: &OrgId) -> Result<Option<Batch>, LedgerError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE org_id = $1
             ORDER BY batch_seq DESC LIMIT 1"
        ))
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(BatchRow::into_record).transpose()
    }

    async fn update_batch(&self, batch: &Batch) -> Result<Batch, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        update_batch_on(&mut conn, batch).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user_on(&mut tx, user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn update_batch_with_user(
        &self,
        batch: &Batch,
        user: NewUser,
    ) -> Result<(Batch, User), LedgerError> {
        let mut tx = self.pool.begin().await?;
        // Dropping `tx` on any error rolls back the batch write.
        let batch = update_batch_on(&mut tx, batch).await?;
        let user = insert_user_on(&mut tx, user).await?;
        tx.commit().await?;
        Ok((batch, user))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, LedgerError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_record).transpose()
    }

    async fn get_user_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<User>, LedgerError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reference_number = $1"
        ))
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_record).transpose()
    }

    async fn apply_transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: u64,
    ) -> Result<TransferBalances, LedgerError> {
        let sender = self
            .get_user(from)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(from.to_string()))?;
        let receiver = self
            .get_user(to)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(to.to_string()))?;
        let plan = plan_transfer(&sender, &receiver, amount)?;

        let mut tx = self.pool.begin().await?;
        for (user, new_balance) in [
            (&sender, plan.sender_new_balance),
            (&receiver, plan.receiver_new_balance),
        ] {
            let result = sqlx::query(
                "UPDATE users SET balance = $1, version = version + 1
                 WHERE user_id = $2 AND version = $3",
            )
            .bind(balance_to_db(user.user_id.get(), new_balance)?)
            .bind(user.user_id.get())
            .bind(user.version)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                // Dropping `tx` rolls back the sender debit if it was applied.
                return Err(LedgerError::Conflict {
                    entity: "user",
                    key: user.user_id.to_string(),
                    expected: user.version,
                });
            }
        }
        tx.commit().await?;

        tracing::debug!(
            from = %from,
            to = %to,
            amount,
            "ledger transfer applied"
        );
        Ok(plan)
    }
}
