//! Transfers end to end against the in-memory ledger, the mock proving
//! toolchain and the mock settlement client.

use std::sync::Arc;

use async_trait::async_trait;
use fincube_batch::BatchManager;
use fincube_core::{
    BatchId, ErrorKind, IdentityKey, OrgId, ReferenceNumber, SettlementAddress, UserId,
};
use fincube_crypto::{derive_secret, nullifier};
use fincube_ledger::{
    Batch, LedgerError, LedgerStore, MemoryLedger, NewUser, Organization, TransferBalances, User,
};
use fincube_settlement::{MockSettlementClient, SettlementClient, SettlementError};
use fincube_transfer::{
    AuditStatus, EventConfig, EventPublisher, RecordingSink, TransferConfig,
    TransferOrchestrator, TransferOutcome, TransferRequest, TransferStage, TransferState,
};
use fincube_zkp::{MockToolchain, PipelineConfig, ProofPipeline};

const ORG_A: &str = "0x00000000000000000000000000000000000000a1";
const ORG_B: &str = "0x00000000000000000000000000000000000000b2";
const TOKEN: &str = "0x000000000000000000000000000000000000c0de";

fn addr(s: &str) -> SettlementAddress {
    SettlementAddress::new(s).unwrap()
}

/// Wraps a ledger and fails every balance transfer with a version conflict.
struct ConflictingLedger {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl LedgerStore for ConflictingLedger {
    async fn create_organization(&self, org: &Organization) -> Result<(), LedgerError> {
        self.inner.create_organization(org).await
    }
    async fn get_organization(&self, id: &OrgId) -> Result<Option<Organization>, LedgerError> {
        self.inner.get_organization(id).await
    }
    async fn get_organization_by_address(
        &self,
        address: &SettlementAddress,
    ) -> Result<Option<Organization>, LedgerError> {
        self.inner.get_organization_by_address(address).await
    }
    async fn create_batch(&self, batch: &Batch) -> Result<(), LedgerError> {
        self.inner.create_batch(batch).await
    }
    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, LedgerError> {
        self.inner.get_batch(id).await
    }
    async fn latest_batch(&self, id: &OrgId) -> Result<Option<Batch>, LedgerError> {
        self.inner.latest_batch(id).await
    }
    async fn update_batch(&self, batch: &Batch) -> Result<Batch, LedgerError> {
        self.inner.update_batch(batch).await
    }
    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError> {
        self.inner.insert_user(user).await
    }
    async fn update_batch_with_user(
        &self,
        batch: &Batch,
        user: NewUser,
    ) -> Result<(Batch, User), LedgerError> {
        self.inner.update_batch_with_user(batch, user).await
    }
    async fn get_user(&self, id: UserId) -> Result<Option<User>, LedgerError> {
        self.inner.get_user(id).await
    }
    async fn get_user_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<User>, LedgerError> {
        self.inner.get_user_by_reference(reference).await
    }
    async fn apply_transfer(
        &self,
        from: UserId,
        _to: UserId,
        _amount: u64,
    ) -> Result<TransferBalances, LedgerError> {
        Err(LedgerError::Conflict {
            entity: "user",
            key: from.to_string(),
            expected: 0,
        })
    }
}

struct Harness {
    memory: Arc<MemoryLedger>,
    manager: BatchManager,
    toolchain: Arc<MockToolchain>,
    settlement: Arc<MockSettlementClient>,
    sink: Arc<RecordingSink>,
    orchestrator: TransferOrchestrator,
    org_a: Organization,
    org_b: Organization,
    sender: User,
    receiver: User,
    colleague: User,
    _scratch: tempfile::TempDir,
}

async fn harness_with(conflicting: bool) -> Harness {
    let memory = Arc::new(MemoryLedger::new());
    let ledger: Arc<dyn LedgerStore> = if conflicting {
        Arc::new(ConflictingLedger {
            inner: memory.clone(),
        }) as Arc<dyn LedgerStore>
    } else {
        memory.clone() as Arc<dyn LedgerStore>
    };
    let manager = BatchManager::new(ledger.clone());

    let org_a = manager.register_organization(addr(ORG_A)).await.unwrap();
    let org_b = manager.register_organization(addr(ORG_B)).await.unwrap();
    let sender = manager
        .enroll(
            &org_a,
            IdentityKey::derive(&org_a.org_id, "sender@a.example"),
            Some(UserId::new(2001).unwrap()),
            900,
        )
        .await
        .unwrap()
        .user;
    let colleague = manager
        .enroll(
            &org_a,
            IdentityKey::derive(&org_a.org_id, "colleague@a.example"),
            None,
            10,
        )
        .await
        .unwrap()
        .user;
    let receiver = manager
        .enroll(
            &org_b,
            IdentityKey::derive(&org_b.org_id, "receiver@b.example"),
            None,
            50,
        )
        .await
        .unwrap()
        .user;

    let scratch = tempfile::tempdir().unwrap();
    let toolchain = Arc::new(MockToolchain::new());
    let pipeline = Arc::new(ProofPipeline::new(
        toolchain.clone(),
        PipelineConfig::default().with_scratch_root(scratch.path()),
    ));
    let settlement = Arc::new(MockSettlementClient::new(addr(ORG_A), addr(TOKEN)));
    let sink = Arc::new(RecordingSink::new());
    let (publisher, _handle) = EventPublisher::spawn(sink.clone(), &EventConfig::default());

    let orchestrator = TransferOrchestrator::new(
        ledger,
        pipeline,
        settlement.clone(),
        TransferConfig::default(),
    )
    .with_events(publisher);

    Harness {
        memory,
        manager,
        toolchain,
        settlement,
        sink,
        orchestrator,
        org_a,
        org_b,
        sender,
        receiver,
        colleague,
        _scratch: scratch,
    }
}

async fn harness() -> Harness {
    harness_with(false).await
}

fn request_to(user: &User, amount: f64) -> TransferRequest {
    TransferRequest::new(user.reference_number.as_str(), amount, 2001)
}

async fn balance(h: &Harness, user: &User) -> u64 {
    h.memory.get_user(user.user_id).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn cross_org_transfer_settles_and_updates_ledger() {
    let h = harness().await;
    let report = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap();

    let TransferOutcome::CrossOrg {
        blockchain, ledger, ..
    } = &report.outcome
    else {
        panic!("expected cross-org outcome, got {:?}", report.outcome);
    };
    assert!(blockchain.transaction_hash.starts_with("0x"));
    assert_eq!(blockchain.audit, AuditStatus::Queued);
    assert_eq!(ledger.sender_prev_balance, 900);
    assert_eq!(ledger.sender_new_balance, 800);
    assert_eq!(ledger.receiver_new_balance, ledger.receiver_prev_balance + 100);
    assert_eq!(balance(&h, &h.sender).await, 800);
    assert_eq!(balance(&h, &h.receiver).await, 150);

    // The nullifier binds the receiver's secret to the paying organization.
    let secret = derive_secret(&h.receiver.identity_key, &h.org_b.org_salt);
    let expected = nullifier(&secret, &addr(ORG_A).to_field()).unwrap();
    assert_eq!(blockchain.nullifier, expected);
    assert_eq!(blockchain.nullifier.to_be_bytes().len(), 32);
    assert!(blockchain.memo.len() <= 1024);
    assert!(blockchain.memo.contains(r#""amount":"100""#));

    let submitted = h.settlement.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].amount, 100 * 10u128.pow(18));
    assert_eq!(submitted[0].to, addr(ORG_B));
    assert_eq!(submitted[0].public_inputs[2], expected);
    assert_eq!(submitted[0].public_inputs[1], addr(ORG_A).to_field());
    assert!(h.settlement.is_nullifier_used(&expected).await.unwrap());

    assert_eq!(
        report.trace.path(),
        vec![
            TransferState::Validated,
            TransferState::UsersResolved,
            TransferState::ProofGenerated,
            TransferState::NullifierSet,
            TransferState::MemoBuilt,
            TransferState::ChainSubmitted,
            TransferState::LedgerUpdated,
            TransferState::Done,
        ]
    );
    assert!(h.toolchain.invocations() > 0);
}

#[tokio::test]
async fn refused_audit_event_is_reported_and_recoverable() {
    let h = harness().await;
    let sink = Arc::new(RecordingSink::new());
    let (publisher, delivery) = EventPublisher::spawn(sink.clone(), &EventConfig::default());
    // With the delivery task gone the queue refuses every event.
    delivery.abort();
    let _ = delivery.await;
    let dead_letters = publisher.dead_letters().clone();

    let scratch = tempfile::tempdir().unwrap();
    let orchestrator = TransferOrchestrator::new(
        h.memory.clone(),
        Arc::new(ProofPipeline::new(
            h.toolchain.clone(),
            PipelineConfig::default().with_scratch_root(scratch.path()),
        )),
        h.settlement.clone(),
        TransferConfig::default(),
    )
    .with_events(publisher);

    let report = orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap();
    let blockchain = report.outcome.blockchain().unwrap();
    assert_eq!(blockchain.audit, AuditStatus::DeadLettered);
    assert_eq!(balance(&h, &h.receiver).await, 150);

    let backlog = dead_letters.list();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].event.transaction_hash, blockchain.transaction_hash);

    let replay = dead_letters.replay(sink.as_ref()).await;
    assert_eq!(replay.delivered, vec![blockchain.transaction_hash.clone()]);
    assert!(dead_letters.is_empty());
    assert_eq!(sink.events()[0].amount, 100);
}

#[tokio::test]
async fn cross_org_transfer_publishes_audit_event() {
    let h = harness().await;
    h.orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap();

    for _ in 0..100 {
        if !h.sink.events().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.from_user_id, h.sender.user_id);
    assert_eq!(event.to_user_id, h.receiver.user_id);
    assert_eq!(event.amount, 100);
    assert_eq!(event.sender_address, addr(ORG_A));
    assert_eq!(event.receiver_address, addr(ORG_B));
    assert_eq!(event.chain_id, h.settlement.chain_id());
}

#[tokio::test]
async fn intra_org_transfer_never_touches_prover_or_chain() {
    let h = harness().await;
    let report = h
        .orchestrator
        .execute_transfer(&request_to(&h.colleague, 40.0))
        .await
        .unwrap();

    let TransferOutcome::IntraOrg { ledger, .. } = report.outcome else {
        panic!("expected intra-org outcome");
    };
    assert_eq!(ledger.sender_new_balance, 860);
    assert_eq!(ledger.receiver_new_balance, 50);
    assert_eq!(h.toolchain.invocations(), 0);
    assert_eq!(h.settlement.call_count(), 0);
    assert!(report.trace.path().contains(&TransferState::DbOnly));
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn ledger_conflict_after_settlement_is_partial() {
    let h = harness_with(true).await;
    let report = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap();

    let TransferOutcome::Partial {
        blockchain,
        ledger_error,
        pending_id,
        ..
    } = &report.outcome
    else {
        panic!("expected partial outcome, got {:?}", report.outcome);
    };
    assert!(blockchain.transaction_hash.starts_with("0x"));
    assert_eq!(ledger_error.kind, ErrorKind::LedgerConflict);
    assert_eq!(report.trace.state, TransferState::Partial);
    assert_eq!(h.settlement.submissions().len(), 1);

    // The owed balance change is queued and can be applied later.
    let queue = h.orchestrator.reconciliation();
    let pending = queue.list();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, *pending_id);
    assert_eq!(pending[0].receipt.transaction_hash, blockchain.transaction_hash);
    assert_eq!(balance(&h, &h.sender).await, 900);

    let applied = queue
        .reconcile(h.memory.as_ref(), *pending_id)
        .await
        .unwrap();
    assert_eq!(applied.sender_new_balance, 800);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn oversized_memo_fails_before_any_subprocess_or_rpc() {
    let h = harness().await;
    let assignment = h
        .manager
        .assign_user(
            &h.org_b,
            &IdentityKey::derive(&h.org_b.org_id, "long@b.example"),
        )
        .await
        .unwrap();
    let long_ref = ReferenceNumber::new(format!("{ORG_B}_{}", "x".repeat(1100))).unwrap();
    let receiver = h
        .memory
        .insert_user(NewUser {
            user_id: None,
            batch_id: assignment.batch.batch_id,
            identity_key: IdentityKey::derive(&h.org_b.org_id, "long@b.example"),
            balance: 0,
            reference_number: long_ref,
        })
        .await
        .unwrap();

    let err = h
        .orchestrator
        .execute_transfer(&request_to(&receiver, 1.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoTooLong);
    assert_eq!(err.stage, TransferStage::BuildMemo);
    assert!(err.transfer_id.is_some());
    assert_eq!(h.toolchain.invocations(), 0);
    assert_eq!(h.settlement.call_count(), 0);
    assert_eq!(balance(&h, &h.sender).await, 900);
}

#[tokio::test]
async fn repeated_transfer_is_stopped_by_the_nullifier() {
    let h = harness().await;
    h.orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap();
    let invocations = h.toolchain.invocations();

    let err = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NullifierAlreadyUsed);
    assert_eq!(h.toolchain.invocations(), invocations);
    assert_eq!(balance(&h, &h.sender).await, 800);
    assert_eq!(h.settlement.submissions().len(), 1);
}

#[tokio::test]
async fn contract_nullifier_rejection_is_reported() {
    let h = harness().await;
    h.settlement.fail_next(SettlementError::NullifierAlreadyUsed {
        nullifier: "0x01".into(),
    });
    let err = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 100.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NullifierAlreadyUsed);
    assert_eq!(err.stage, TransferStage::SubmitChain);
    assert_eq!(balance(&h, &h.sender).await, 900);
    assert_eq!(balance(&h, &h.receiver).await, 50);
}

#[tokio::test]
async fn invalid_request_has_no_side_effects() {
    let h = harness().await;
    let err = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 0.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.stage, TransferStage::Validate);
    assert!(err.transfer_id.is_none());
    assert_eq!(h.settlement.call_count(), 0);
}

#[tokio::test]
async fn unknown_users_and_organizations() {
    let h = harness().await;
    let unknown_receiver = TransferRequest::new(format!("{ORG_B}_nobody"), 1.0, 2001);
    let err = h.orchestrator.execute_transfer(&unknown_receiver).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserNotFound);

    let unknown_sender = TransferRequest::new(h.receiver.reference_number.as_str(), 1.0, 999_999);
    let err = h.orchestrator.execute_transfer(&unknown_sender).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserNotFound);
    assert_eq!(err.stage, TransferStage::ResolveUsers);
}

#[tokio::test]
async fn insufficient_balance_is_caught_before_proving() {
    let h = harness().await;
    let err = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 901.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(h.toolchain.invocations(), 0);
    assert_eq!(h.settlement.call_count(), 0);
}

#[tokio::test]
async fn unapproved_organization_is_refused_before_proving() {
    let h = harness().await;
    h.settlement.revoke(&addr(ORG_B));
    let err = h
        .orchestrator
        .execute_transfer(&request_to(&h.receiver, 10.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainRejected);
    assert_eq!(err.stage, TransferStage::CheckGovernance);
    assert_eq!(h.toolchain.invocations(), 0);
}

#[tokio::test]
async fn receiver_outside_its_batch_fails_input_preparation() {
    let h = harness().await;
    let batch = h.memory.latest_batch(&h.org_b.org_id).await.unwrap().unwrap();
    let stranger = h
        .memory
        .insert_user(NewUser {
            user_id: None,
            batch_id: batch.batch_id,
            identity_key: IdentityKey::derive(&h.org_b.org_id, "never-assigned@b.example"),
            balance: 0,
            reference_number: ReferenceNumber::generate(&addr(ORG_B)),
        })
        .await
        .unwrap();

    let err = h
        .orchestrator
        .execute_transfer(&request_to(&stranger, 5.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputPreparationFailed);
    assert_eq!(err.stage, TransferStage::PrepareProof);
    assert_eq!(h.toolchain.invocations(), 0);
    assert_eq!(h.settlement.call_count(), 0);
}

#[tokio::test]
async fn concurrent_transfers_from_one_sender_never_overdraw() {
    let h = Arc::new(harness().await);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.orchestrator
                .execute_transfer(&request_to(&h.colleague, 200.0))
                .await
        }));
    }
    let mut succeeded = 0u64;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert!(succeeded <= 4);
    assert_eq!(balance(&h, &h.sender).await, 900 - 200 * succeeded);
    assert_eq!(balance(&h, &h.colleague).await, 10 + 200 * succeeded);
}
