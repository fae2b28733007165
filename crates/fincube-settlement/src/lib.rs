//! # fincube-settlement — Settlement Contract Boundary
//!
//! The engine never reimplements the contracts. It calls them:
//!
//! - the **FinCube** contract: `safeTransfer`, nullifier bookkeeping,
//!   approved-token configuration;
//! - the **verifier** contract: `verify(proof, publicInputs)`;
//! - the **governance** contract: organization approval.
//!
//! [`SettlementClient`] is the seam. [`EvmSettlementClient`] talks JSON-RPC
//! to a node that signs for the configured sender; [`MockSettlementClient`]
//! records calls and keeps its own nullifier set for tests.
//!
//! The settlement memo ([`SettlementMemo`]) is built here too, since its
//! size limit is a property of what the contract accepts.

pub mod abi;
pub mod client;
pub mod error;
pub mod evm;
pub mod memo;
pub mod mock;
pub mod revert;

pub use client::{ChainReceipt, SettlementClient, SettlementRequest};
pub use error::{SettlementError, VerificationFailure};
pub use evm::{EvmSettlementClient, EvmSettlementConfig};
pub use memo::{MemoError, SettlementMemo, MEMO_MAX_BYTES, MEMO_VERSION};
pub use mock::MockSettlementClient;
