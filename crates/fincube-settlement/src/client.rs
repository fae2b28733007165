//! # Settlement Client Trait
//!
//! Everything the engine needs from the chain. Implementations are
//! constructed explicitly and passed in; nothing here reaches for a global
//! provider or wallet.

use async_trait::async_trait;
use fincube_core::{FieldElement, ReferenceNumber, SettlementAddress};
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;

/// Arguments of `safeTransfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub to: SettlementAddress,
    /// Token base units (ledger amount scaled by the token's decimals).
    pub amount: u128,
    /// Canonical memo text.
    pub memo: String,
    pub nullifier: FieldElement,
    pub sender_reference: ReferenceNumber,
    pub receiver_reference: ReferenceNumber,
    pub proof: Vec<u8>,
    pub public_inputs: Vec<FieldElement>,
}

/// A mined settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
}

#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// View call: does the verifier accept this proof?
    async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &[FieldElement],
    ) -> Result<bool, SettlementError>;

    /// Submit a settlement and wait for its receipt. The contract checks
    /// both organizations are approved, verifies the proof, records the
    /// nullifier and moves the token, atomically.
    async fn safe_transfer(
        &self,
        request: &SettlementRequest,
    ) -> Result<ChainReceipt, SettlementError>;

    /// Governance read: is the organization at `address` approved?
    async fn is_organization_approved(
        &self,
        address: &SettlementAddress,
    ) -> Result<bool, SettlementError>;

    /// Governance read: the token the contract settles in.
    async fn approved_token(&self) -> Result<SettlementAddress, SettlementError>;

    /// View call: has the contract already recorded `nullifier`?
    async fn is_nullifier_used(&self, nullifier: &FieldElement) -> Result<bool, SettlementError>;

    /// The account that signs settlement transactions.
    fn signer_address(&self) -> &SettlementAddress;

    /// EVM chain id.
    fn chain_id(&self) -> u64;
}
