//! # fincube-batch — Membership Batches
//!
//! A batch commits to up to `MAX_BATCH_MEMBERS` member secrets as the roots
//! of one polynomial. The coefficient vector is public; the roots are not.
//! A member proves membership by exhibiting a root without revealing it.
//!
//! - [`polynomial`]: building, extending and evaluating root polynomials.
//! - [`commitment`]: the public commitment hash over a coefficient vector.
//! - [`manager`]: organization registration and per-organization atomic
//!   member assignment on top of a [`LedgerStore`](fincube_ledger::LedgerStore).

pub mod commitment;
pub mod error;
pub mod manager;
pub mod polynomial;

pub use commitment::commitment_hash;
pub use error::BatchError;
pub use manager::{Assignment, BatchManager, Enrollment};
pub use polynomial::{build_polynomial, evaluate, extend_polynomial, is_root};
