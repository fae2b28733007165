//! # Transfer Orchestrator
//!
//! Routes a validated request down one of two paths:
//!
//! - **intra-organization**: sender and receiver belong to the same
//!   organization. A single optimistic ledger transfer, nothing else.
//! - **cross-organization**: the receiver proves membership of its
//!   organization to the sender's organization, the settlement contract
//!   verifies the proof and consumes the nullifier, then the ledger
//!   follows the chain.
//!
//! ## Ordering
//!
//! Everything that can fail without outside contact runs first: user and
//! organization resolution, the balance pre-check, the membership
//! self-check, nullifier derivation and memo encoding. An oversized memo
//! or a non-member receiver therefore fails before any subprocess or RPC.
//! Governance and nullifier reads come next, then the proof, then the one
//! state-changing chain call.
//!
//! ## Partial outcomes
//!
//! Once `safeTransfer` is mined the funds have moved and cannot be moved
//! back. A ledger failure after that point is reported as
//! [`TransferOutcome::Partial`] carrying both the receipt and the ledger
//! error, and the missing balance change is queued for reconciliation.
//!
//! No step is retried here, and no ledger lock is held across a proof or
//! chain await.

use std::sync::Arc;

use fincube_batch::{commitment_hash, is_root};
use fincube_core::{FieldElement, ReferenceNumber, Timestamp};
use fincube_crypto::{derive_secret, nullifier};
use fincube_ledger::{LedgerError, LedgerStore, Organization, User};
use fincube_settlement::{SettlementClient, SettlementError, SettlementMemo, SettlementRequest};
use fincube_zkp::{FormattedProof, ProofPipeline, ProverInputs};
use tracing::Instrument;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferFailure, TransferStage};
use crate::events::{AuditEvent, AuditStatus, EventPublisher};
use crate::reconcile::ReconciliationQueue;
use crate::request::{TransferRequest, ValidatedTransfer};
use crate::response::{BlockchainResult, TransferMode, TransferOutcome, TransferReport};
use crate::state::{TransferState, TransferTrace};

const NULLIFIER_INPUT_INDEX: usize = 2;

/// Sender and receiver with their organizations.
struct Resolved {
    sender: User,
    receiver: User,
    sender_org: Organization,
    receiver_org: Organization,
}

impl Resolved {
    fn mode(&self) -> TransferMode {
        if self.sender_org.org_id == self.receiver_org.org_id {
            TransferMode::IntraOrg
        } else {
            TransferMode::CrossOrg
        }
    }
}

/// Everything computed locally before the first outside call.
struct Prepared {
    inputs: ProverInputs,
    memo: String,
    base_units: u128,
}

type StageResult<T> = Result<T, TransferError>;

pub struct TransferOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    pipeline: Arc<ProofPipeline>,
    settlement: Arc<dyn SettlementClient>,
    events: Option<EventPublisher>,
    reconciliation: Arc<ReconciliationQueue>,
    config: TransferConfig,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        pipeline: Arc<ProofPipeline>,
        settlement: Arc<dyn SettlementClient>,
        config: TransferConfig,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            settlement,
            events: None,
            reconciliation: Arc::new(ReconciliationQueue::new()),
            config,
        }
    }

    /// Publish an audit event for every settled cross-organization transfer.
    pub fn with_events(mut self, publisher: EventPublisher) -> Self {
        self.events = Some(publisher);
        self
    }

    /// Share a reconciliation queue with other orchestrators or an
    /// operator surface.
    pub fn with_reconciliation(mut self, queue: Arc<ReconciliationQueue>) -> Self {
        self.reconciliation = queue;
        self
    }

    pub fn reconciliation(&self) -> &Arc<ReconciliationQueue> {
        &self.reconciliation
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Validate, route and execute one transfer.
    pub async fn execute_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReport, TransferError> {
        let validated = request
            .validate()
            .map_err(|e| TransferError::new(TransferStage::Validate, e))?;

        let mut trace = TransferTrace::new();
        let span = tracing::info_span!(
            "transfer",
            transfer_id = %trace.transfer_id,
            sender_user_id = %validated.sender_user_id,
            amount = validated.amount,
        );

        let mut mode = None;
        let result = self
            .run(&validated, &mut trace, &mut mode)
            .instrument(span)
            .await;
        let mode_label = mode.map_or("unresolved", |m: TransferMode| m.as_str());

        match result {
            Ok(outcome) => {
                let outcome_label = if outcome.is_partial() { "partial" } else { "done" };
                metrics::counter!(
                    "fincube_transfers_total",
                    "mode" => mode_label,
                    "outcome" => outcome_label
                )
                .increment(1);
                Ok(TransferReport { outcome, trace })
            }
            Err(err) => {
                trace.fail();
                metrics::counter!(
                    "fincube_transfers_total",
                    "mode" => mode_label,
                    "outcome" => "failed"
                )
                .increment(1);
                tracing::warn!(
                    transfer_id = %trace.transfer_id,
                    stage = %err.stage,
                    kind = %err.kind(),
                    "transfer failed: {}",
                    err.failure
                );
                Err(err.with_transfer_id(trace.transfer_id))
            }
        }
    }

    async fn run(
        &self,
        validated: &ValidatedTransfer,
        trace: &mut TransferTrace,
        mode: &mut Option<TransferMode>,
    ) -> StageResult<TransferOutcome> {
        let resolved = self.resolve(validated).await?;
        trace
            .advance(TransferState::UsersResolved)
            .map_err(|e| TransferError::new(TransferStage::ResolveUsers, e))?;
        *mode = Some(resolved.mode());

        match resolved.mode() {
            TransferMode::IntraOrg => self.intra_org(&resolved, validated.amount, trace).await,
            TransferMode::CrossOrg => self.cross_org(&resolved, validated.amount, trace).await,
        }
    }

    async fn resolve(&self, validated: &ValidatedTransfer) -> StageResult<Resolved> {
        let stage = TransferStage::ResolveUsers;
        let sender = self
            .ledger
            .get_user(validated.sender_user_id)
            .await
            .map_err(|e| TransferError::new(stage, e))?
            .ok_or_else(|| {
                TransferError::new(
                    stage,
                    TransferFailure::UserNotFound(format!("sender {}", validated.sender_user_id)),
                )
            })?;
        let receiver = self
            .ledger
            .get_user_by_reference(&validated.receiver_reference)
            .await
            .map_err(|e| TransferError::new(stage, e))?
            .ok_or_else(|| {
                TransferError::new(
                    stage,
                    TransferFailure::UserNotFound(format!(
                        "receiver {}",
                        validated.receiver_reference
                    )),
                )
            })?;
        if sender.user_id == receiver.user_id {
            return Err(TransferError::new(
                stage,
                LedgerError::SameAccount(sender.user_id.get()),
            ));
        }

        let sender_org = self.organization_of(&sender.reference_number).await?;
        let receiver_org = self.organization_of(&receiver.reference_number).await?;

        if sender.balance < validated.amount {
            return Err(TransferError::new(
                stage,
                TransferFailure::InsufficientBalance {
                    user_id: sender.user_id.get(),
                    balance: sender.balance,
                    requested: validated.amount,
                },
            ));
        }

        Ok(Resolved {
            sender,
            receiver,
            sender_org,
            receiver_org,
        })
    }

    async fn organization_of(&self, reference: &ReferenceNumber) -> StageResult<Organization> {
        let stage = TransferStage::ResolveUsers;
        let address = reference.settlement_address();
        self.ledger
            .get_organization_by_address(&address)
            .await
            .map_err(|e| TransferError::new(stage, e))?
            .ok_or_else(|| TransferError::new(stage, TransferFailure::OrganizationNotFound(address)))
    }

    async fn intra_org(
        &self,
        resolved: &Resolved,
        amount: u64,
        trace: &mut TransferTrace,
    ) -> StageResult<TransferOutcome> {
        let stage = TransferStage::UpdateLedger;
        trace
            .advance(TransferState::DbOnly)
            .map_err(|e| TransferError::new(stage, e))?;

        let balances = self
            .ledger
            .apply_transfer(resolved.sender.user_id, resolved.receiver.user_id, amount)
            .await
            .map_err(|e| TransferError::new(stage, e))?;

        for state in [TransferState::LedgerUpdated, TransferState::Done] {
            trace
                .advance(state)
                .map_err(|e| TransferError::new(stage, e))?;
        }
        tracing::info!(
            org_id = %resolved.sender_org.org_id,
            receiver_user_id = %resolved.receiver.user_id,
            "intra-organization transfer applied"
        );
        Ok(TransferOutcome::IntraOrg {
            transfer_id: trace.transfer_id,
            ledger: balances,
        })
    }

    async fn cross_org(
        &self,
        resolved: &Resolved,
        amount: u64,
        trace: &mut TransferTrace,
    ) -> StageResult<TransferOutcome> {
        let prepared = self.prepare(resolved, amount).await?;
        self.check_governance(resolved).await?;
        self.check_nullifier_unused(&prepared.inputs.nullifier).await?;

        let proof = self
            .pipeline
            .generate(&prepared.inputs)
            .await
            .map_err(|e| TransferError::new(TransferStage::GenerateProof, e))?;
        trace
            .advance(TransferState::ProofGenerated)
            .map_err(|e| TransferError::new(TransferStage::GenerateProof, e))?;

        let nullifier = bind_nullifier(&proof, &prepared.inputs.nullifier)?;
        trace
            .advance(TransferState::NullifierSet)
            .map_err(|e| TransferError::new(TransferStage::BindNullifier, e))?;

        let request = SettlementRequest {
            to: resolved.receiver_org.settlement_address.clone(),
            amount: prepared.base_units,
            memo: prepared.memo,
            nullifier,
            sender_reference: resolved.sender.reference_number.clone(),
            receiver_reference: resolved.receiver.reference_number.clone(),
            proof: proof.proof,
            public_inputs: proof.public_inputs,
        };
        trace
            .advance(TransferState::MemoBuilt)
            .map_err(|e| TransferError::new(TransferStage::BuildMemo, e))?;

        let receipt = self.settlement.safe_transfer(&request).await.map_err(|e| {
            if let Some(tx_hash) = e.transaction_hash() {
                tracing::error!(
                    %tx_hash,
                    nullifier = %nullifier,
                    "settlement transaction submitted but not confirmed: {e}"
                );
            }
            TransferError::new(TransferStage::SubmitChain, e)
        })?;
        trace
            .advance(TransferState::ChainSubmitted)
            .map_err(|e| TransferError::new(TransferStage::SubmitChain, e))?;
        tracing::info!(
            tx_hash = %receipt.transaction_hash,
            block_number = receipt.block_number,
            receiver_org = %resolved.receiver_org.settlement_address,
            "cross-organization settlement mined"
        );

        let audit = match &self.events {
            Some(events) => events.publish(AuditEvent {
                transaction_hash: receipt.transaction_hash.clone(),
                signer_address: self.settlement.signer_address().clone(),
                chain_id: self.settlement.chain_id(),
                from_user_id: resolved.sender.user_id,
                to_user_id: resolved.receiver.user_id,
                amount,
                sender_address: resolved.sender_org.settlement_address.clone(),
                receiver_address: resolved.receiver_org.settlement_address.clone(),
                block_number: receipt.block_number,
                gas_used: receipt.gas_used,
                memo: request.memo.clone(),
                nullifier,
            }),
            None => AuditStatus::Disabled,
        };

        let blockchain = BlockchainResult {
            transaction_hash: receipt.transaction_hash.clone(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            chain_id: self.settlement.chain_id(),
            signer_address: self.settlement.signer_address().clone(),
            nullifier,
            memo: request.memo.clone(),
            amount: request.amount.to_string(),
            audit,
        };

        match self
            .ledger
            .apply_transfer(resolved.sender.user_id, resolved.receiver.user_id, amount)
            .await
        {
            Ok(balances) => {
                trace
                    .advance(TransferState::LedgerUpdated)
                    .map_err(|e| TransferError::new(TransferStage::UpdateLedger, e))?;
                trace
                    .advance(TransferState::Done)
                    .map_err(|e| TransferError::new(TransferStage::UpdateLedger, e))?;
                Ok(TransferOutcome::CrossOrg {
                    transfer_id: trace.transfer_id,
                    blockchain,
                    ledger: balances,
                })
            }
            Err(ledger_err) => {
                let ledger_error =
                    TransferError::new(TransferStage::UpdateLedger, ledger_err).detail();
                trace
                    .advance(TransferState::Partial)
                    .map_err(|e| TransferError::new(TransferStage::UpdateLedger, e))?;
                let pending_id = self.reconciliation.record(
                    trace.transfer_id,
                    receipt,
                    resolved.sender.user_id,
                    resolved.receiver.user_id,
                    amount,
                    ledger_error.clone(),
                );
                tracing::warn!(
                    tx_hash = %blockchain.transaction_hash,
                    pending_id = %pending_id,
                    kind = %ledger_error.kind,
                    "settlement mined but ledger update failed: {}",
                    ledger_error.message
                );
                Ok(TransferOutcome::Partial {
                    transfer_id: trace.transfer_id,
                    blockchain,
                    ledger_error,
                    pending_id,
                })
            }
        }
    }

    /// Local work for the cross-organization path: receiver secret and
    /// membership, public inputs, memo and on-chain amount.
    async fn prepare(&self, resolved: &Resolved, amount: u64) -> StageResult<Prepared> {
        let stage = TransferStage::PrepareProof;
        let base_units = self.config.base_units(amount).ok_or_else(|| {
            TransferError::new(
                TransferStage::Validate,
                TransferFailure::AmountOverflow {
                    amount,
                    decimals: self.config.token_decimals,
                },
            )
        })?;

        let receiver = &resolved.receiver;
        let batch = self
            .ledger
            .get_batch(&receiver.batch_id)
            .await
            .map_err(|e| TransferError::new(stage, e))?
            .ok_or_else(|| {
                TransferError::new(stage, LedgerError::BatchNotFound(receiver.batch_id.to_string()))
            })?;

        let secret = derive_secret(&receiver.identity_key, &resolved.receiver_org.org_salt);
        if !is_root(&batch.coefficients, &secret) {
            return Err(TransferError::new(
                stage,
                TransferFailure::NotAMember {
                    reference: receiver.reference_number.to_string(),
                    batch_id: batch.batch_id.to_string(),
                },
            ));
        }

        let commitment =
            commitment_hash(&batch.coefficients).map_err(|e| TransferError::new(stage, e))?;
        let verifier_key = resolved.sender_org.settlement_address.to_field();
        let nullifier =
            nullifier(&secret, &verifier_key).map_err(|e| TransferError::new(stage, e))?;

        let memo = SettlementMemo::new(
            resolved.sender.reference_number.clone(),
            receiver.reference_number.clone(),
            resolved.sender_org.settlement_address.clone(),
            resolved.receiver_org.settlement_address.clone(),
            amount,
            Timestamp::now(),
        )
        .encode_bounded(self.config.memo_max_bytes)
        .map_err(|e| TransferError::new(TransferStage::BuildMemo, e))?;

        Ok(Prepared {
            inputs: ProverInputs {
                secret,
                coefficients: batch.coefficients,
                commitment_hash: commitment,
                verifier_key,
                nullifier,
                is_verified_member: true,
            },
            memo,
            base_units,
        })
    }

    /// Both organizations must be approved; the contract checks the same.
    async fn check_governance(&self, resolved: &Resolved) -> StageResult<()> {
        let stage = TransferStage::CheckGovernance;
        for org in [&resolved.sender_org, &resolved.receiver_org] {
            let approved = self
                .settlement
                .is_organization_approved(&org.settlement_address)
                .await
                .map_err(|e| TransferError::new(stage, e))?;
            if !approved {
                return Err(TransferError::new(
                    stage,
                    TransferFailure::NotApproved(org.settlement_address.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Skip the proof when the chain already holds the nullifier.
    async fn check_nullifier_unused(&self, nullifier: &FieldElement) -> StageResult<()> {
        let stage = TransferStage::BindNullifier;
        if self
            .settlement
            .is_nullifier_used(nullifier)
            .await
            .map_err(|e| TransferError::new(stage, e))?
        {
            return Err(TransferError::new(
                stage,
                SettlementError::NullifierAlreadyUsed {
                    nullifier: nullifier.to_hex(),
                },
            ));
        }
        Ok(())
    }
}

/// The nullifier submitted on-chain is the one the proof exposes.
fn bind_nullifier(proof: &FormattedProof, expected: &FieldElement) -> StageResult<FieldElement> {
    match proof.public_inputs.get(NULLIFIER_INPUT_INDEX) {
        Some(n) if n == expected => Ok(*n),
        other => Err(TransferError::new(
            TransferStage::BindNullifier,
            fincube_zkp::PipelineError::Format(fincube_zkp::FormatError::PublicInputMismatch {
                index: NULLIFIER_INPUT_INDEX,
                expected: expected.to_hex(),
                actual: other.map_or_else(|| "missing".to_string(), FieldElement::to_hex),
            }),
        )),
    }
}
