//! # Mock Settlement Client
//!
//! An in-process stand-in for the settlement contracts. It mirrors the
//! contract's checks that matter to the engine: organization approval,
//! public-input consistency, and nullifier single use. Receipts are
//! deterministic (`0x` + SHA-256 of the calldata-relevant fields).

use std::collections::HashSet;

use async_trait::async_trait;
use fincube_core::{FieldElement, SettlementAddress};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::client::{ChainReceipt, SettlementClient, SettlementRequest};
use crate::error::{SettlementError, VerificationFailure};

/// Gas reported on every mock receipt.
pub const MOCK_GAS_USED: u64 = 350_000;

const NULLIFIER_INDEX: usize = 2;

#[derive(Debug, Default)]
struct MockState {
    used_nullifiers: HashSet<FieldElement>,
    submissions: Vec<SettlementRequest>,
    unapproved: HashSet<SettlementAddress>,
    injected: Option<SettlementError>,
    block_number: u64,
    calls: usize,
}

#[derive(Debug)]
pub struct MockSettlementClient {
    signer: SettlementAddress,
    token: SettlementAddress,
    chain_id: u64,
    state: Mutex<MockState>,
}

impl MockSettlementClient {
    /// A mock where every organization is approved.
    pub fn new(signer: SettlementAddress, token: SettlementAddress) -> Self {
        Self {
            signer,
            token,
            chain_id: 31337,
            state: Mutex::new(MockState {
                block_number: 1,
                ..MockState::default()
            }),
        }
    }

    /// Mark an organization as not approved by governance.
    pub fn revoke(&self, address: &SettlementAddress) {
        self.state.lock().unapproved.insert(address.clone());
    }

    /// Record a nullifier as already used.
    pub fn mark_nullifier_used(&self, nullifier: FieldElement) {
        self.state.lock().used_nullifiers.insert(nullifier);
    }

    /// Make the next `safe_transfer` fail with `error`.
    pub fn fail_next(&self, error: SettlementError) {
        self.state.lock().injected = Some(error);
    }

    /// Successful submissions, in order.
    pub fn submissions(&self) -> Vec<SettlementRequest> {
        self.state.lock().submissions.clone()
    }

    /// Total number of trait calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    fn receipt_for(request: &SettlementRequest, block_number: u64) -> ChainReceipt {
        let mut hasher = Sha256::new();
        hasher.update(request.nullifier.to_be_bytes());
        hasher.update(request.to.as_str().as_bytes());
        hasher.update(request.amount.to_be_bytes());
        hasher.update(request.memo.as_bytes());
        ChainReceipt {
            transaction_hash: format!("0x{}", hex::encode(hasher.finalize())),
            block_number,
            gas_used: MOCK_GAS_USED,
        }
    }
}

#[async_trait]
impl SettlementClient for MockSettlementClient {
    async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &[FieldElement],
    ) -> Result<bool, SettlementError> {
        self.state.lock().calls += 1;
        if public_inputs.len() != 4 {
            return Err(SettlementError::VerificationFailed {
                reason: VerificationFailure::PublicInputsLength,
                detail: format!("expected 4 public inputs, got {}", public_inputs.len()),
            });
        }
        Ok(!proof.is_empty())
    }

    async fn safe_transfer(
        &self,
        request: &SettlementRequest,
    ) -> Result<ChainReceipt, SettlementError> {
        let mut state = self.state.lock();
        state.calls += 1;

        if let Some(err) = state.injected.take() {
            return Err(err);
        }
        if state.used_nullifiers.contains(&request.nullifier) {
            return Err(SettlementError::NullifierAlreadyUsed {
                nullifier: request.nullifier.to_hex(),
            });
        }
        if request.proof.is_empty() {
            return Err(SettlementError::VerificationFailed {
                reason: VerificationFailure::ProofLength,
                detail: "empty proof".to_string(),
            });
        }
        if request.public_inputs.get(NULLIFIER_INDEX) != Some(&request.nullifier) {
            return Err(SettlementError::VerificationFailed {
                reason: VerificationFailure::ConsistencyCheck,
                detail: "nullifier does not match public inputs".to_string(),
            });
        }
        for reference in [&request.sender_reference, &request.receiver_reference] {
            let address = reference.settlement_address();
            if state.unapproved.contains(&address) {
                return Err(SettlementError::Rejected(format!(
                    "organization {address} is not approved"
                )));
            }
        }

        state.used_nullifiers.insert(request.nullifier);
        state.block_number += 1;
        let receipt = Self::receipt_for(request, state.block_number);
        state.submissions.push(request.clone());
        Ok(receipt)
    }

    async fn is_organization_approved(
        &self,
        address: &SettlementAddress,
    ) -> Result<bool, SettlementError> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(!state.unapproved.contains(address))
    }

    async fn approved_token(&self) -> Result<SettlementAddress, SettlementError> {
        self.state.lock().calls += 1;
        Ok(self.token.clone())
    }

    async fn is_nullifier_used(&self, nullifier: &FieldElement) -> Result<bool, SettlementError> {
        let mut state = self.state.lock();
        state.calls += 1;
        Ok(state.used_nullifiers.contains(nullifier))
    }

    fn signer_address(&self) -> &SettlementAddress {
        &self.signer
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fincube_core::ReferenceNumber;

    const ORG_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ORG_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn client() -> MockSettlementClient {
        MockSettlementClient::new(
            SettlementAddress::new(ORG_A).unwrap(),
            SettlementAddress::new("0x1111111111111111111111111111111111111111").unwrap(),
        )
    }

    fn request(nullifier: u64) -> SettlementRequest {
        let n = FieldElement::from_u64(nullifier);
        SettlementRequest {
            to: SettlementAddress::new(ORG_B).unwrap(),
            amount: 100,
            memo: "{}".to_string(),
            nullifier: n,
            sender_reference: ReferenceNumber::new(format!("{ORG_A}_s")).unwrap(),
            receiver_reference: ReferenceNumber::new(format!("{ORG_B}_r")).unwrap(),
            proof: vec![1; 32],
            public_inputs: vec![
                FieldElement::from_u64(9),
                FieldElement::from_u64(8),
                n,
                FieldElement::one(),
            ],
        }
    }

    #[tokio::test]
    async fn nullifier_is_single_use() {
        let c = client();
        let receipt = c.safe_transfer(&request(7)).await.unwrap();
        assert!(receipt.transaction_hash.starts_with("0x"));
        assert_eq!(receipt.transaction_hash.len(), 66);
        assert!(c.is_nullifier_used(&FieldElement::from_u64(7)).await.unwrap());

        let err = c.safe_transfer(&request(7)).await.unwrap_err();
        assert!(matches!(err, SettlementError::NullifierAlreadyUsed { .. }));
        assert_eq!(c.submissions().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_public_inputs_fail_verification() {
        let c = client();
        let mut req = request(7);
        req.public_inputs[2] = FieldElement::from_u64(99);
        let err = c.safe_transfer(&req).await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::VerificationFailed {
                reason: VerificationFailure::ConsistencyCheck,
                ..
            }
        ));
        assert!(!c.is_nullifier_used(&FieldElement::from_u64(7)).await.unwrap());
    }

    #[tokio::test]
    async fn revoked_organization_is_rejected() {
        let c = client();
        let b = SettlementAddress::new(ORG_B).unwrap();
        c.revoke(&b);
        assert!(!c.is_organization_approved(&b).await.unwrap());
        assert!(matches!(
            c.safe_transfer(&request(3)).await,
            Err(SettlementError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let c = client();
        c.fail_next(SettlementError::Unavailable("node down".into()));
        assert!(c.safe_transfer(&request(1)).await.is_err());
        assert!(c.safe_transfer(&request(1)).await.is_ok());
    }
}
