//! # fincube-crypto — Hash Primitives
//!
//! The two hash functions the membership protocol is built on:
//!
//! - **SHA-256** reduced into the BN254 scalar field ([`digest_to_field`]),
//!   used to derive per-member secrets from an identity key and the
//!   organization salt.
//! - **Poseidon** with circom parameters ([`algebraic_hash`]), used for
//!   batch commitments and nullifiers. This is the hash the membership
//!   circuit and the on-chain verifier recompute, so its output must match
//!   theirs bit for bit.
//!
//! ## Crate Policy
//!
//! - Depends only on `fincube-core` internally.
//! - Everything here is a pure function. No I/O, no logging: secrets pass
//!   through these functions and must never reach a log line.

pub mod error;
pub mod nullifier;
pub mod poseidon;
pub mod sha256;

pub use error::CryptoError;
pub use nullifier::nullifier;
pub use poseidon::{algebraic_hash, POSEIDON_MAX_WIDTH};
pub use sha256::{derive_secret, digest_to_field};
