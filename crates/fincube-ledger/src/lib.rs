//! # fincube-ledger — Ledger Store
//!
//! Durable organizations, membership batches and users, plus the balance
//! transfer API the orchestrator settles against.
//!
//! ## Concurrency contract
//!
//! Every mutable record carries a `version`. Writers read a snapshot, then
//! write conditionally on the version they read. A lost race surfaces as
//! [`LedgerError::Conflict`]; the store never loops internally, so the
//! caller decides whether to retry.
//!
//! ## Backends
//!
//! - [`MemoryLedger`]: `parking_lot`-guarded maps for tests and local runs.
//! - [`PgLedger`]: PostgreSQL via SQLx, with embedded migrations. Optional:
//!   [`init_pool`] returns `None` when no database URL is configured.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use postgres::{init_pool, PgLedger};
pub use records::{Batch, NewUser, Organization, TransferBalances, User};
pub use store::LedgerStore;
