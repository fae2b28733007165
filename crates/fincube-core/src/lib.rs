//! # fincube-core — Foundational Types for the FinCube Settlement Engine
//!
//! This crate is the leaf of the workspace DAG. It defines the type-system
//! primitives every other crate builds on. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Canonical field elements.** [`FieldElement`] wraps the BN254 scalar
//!    field. There is no way to hold a non-reduced value: every constructor
//!    reduces, and deserialization rejects non-canonical encodings.
//!
//! 2. **Newtype wrappers for identifiers.** `UserId`, `OrgId`, `BatchId`,
//!    `SettlementAddress`, `ReferenceNumber`, `IdentityKey`, `OrgSalt` are
//!    distinct types with validated constructors. No bare strings for routing
//!    handles.
//!
//! 3. **`CanonicalBytes` newtype.** Memo and audit payloads are encoded through
//!    `CanonicalBytes::new()` (RFC 8785 JCS), so their size and digest are
//!    deterministic across processes.
//!
//! 4. **One error taxonomy.** [`ErrorKind`] carries the stable type tag of every
//!    failure the engine can report. Each crate's error enum maps onto it.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `fincube-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod error;
pub mod field;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use error::{CanonicalizationError, ErrorKind, FieldError, ValidationError};
pub use field::{FieldElement, FIELD_BYTES, FIELD_MODULUS_DECIMAL};
pub use identity::{
    BatchId, IdentityKey, OrgId, OrgSalt, ReferenceNumber, SettlementAddress, UserId,
};
pub use temporal::Timestamp;

/// Maximum number of members in one batch (`D_max`).
///
/// A batch polynomial has degree at most `MAX_BATCH_MEMBERS` and therefore
/// `MAX_BATCH_MEMBERS + 1` coefficients.
pub const MAX_BATCH_MEMBERS: usize = 128;

/// Number of coefficients stored for every batch polynomial.
pub const BATCH_COEFFICIENTS: usize = MAX_BATCH_MEMBERS + 1;
