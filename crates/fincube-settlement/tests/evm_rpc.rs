//! JSON-RPC behaviour of the EVM settlement client against a mock node.

use std::time::Duration;

use fincube_core::{FieldElement, ReferenceNumber, SettlementAddress};
use fincube_settlement::abi;
use fincube_settlement::{
    EvmSettlementClient, EvmSettlementConfig, SettlementClient, SettlementError,
    SettlementRequest, VerificationFailure,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTRACT: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
const SIGNER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const RECEIVER: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const TX_HASH: &str = "0x5f5e8a0b6a1c0a6a2b0e7c1c8b6a3f0e1d2c3b4a5968778695a4b3c2d1e0f0a1";

fn client(server: &MockServer) -> EvmSettlementClient {
    let config = EvmSettlementConfig::new(
        server.uri(),
        SettlementAddress::new(CONTRACT).unwrap(),
        SettlementAddress::new(SIGNER).unwrap(),
        31337,
    )
    .with_request_timeout(Duration::from_secs(5))
    .with_receipt_polling(Duration::from_millis(300), Duration::from_millis(20));
    EvmSettlementClient::new(config).unwrap()
}

fn request() -> SettlementRequest {
    let nullifier = FieldElement::from_u64(424242);
    SettlementRequest {
        to: SettlementAddress::new(RECEIVER).unwrap(),
        amount: 100_000_000_000_000_000_000,
        memo: r#"{"amount":"100","v":1}"#.to_string(),
        nullifier,
        sender_reference: ReferenceNumber::new(format!("{SIGNER}_sender")).unwrap(),
        receiver_reference: ReferenceNumber::new(format!("{RECEIVER}_receiver")).unwrap(),
        proof: vec![0xab; 64],
        public_inputs: vec![
            FieldElement::from_u64(1),
            SettlementAddress::new(RECEIVER).unwrap().to_field(),
            nullifier,
            FieldElement::one(),
        ],
    }
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

fn rpc_error(message: &str, data: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": 3, "message": message, "data": data}
    }))
}

fn word(value: u8) -> String {
    format!("0x{}{:02x}", "00".repeat(31), value)
}

#[tokio::test]
async fn safe_transfer_returns_mined_receipt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_result(json!("0x")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_getTransactionReceipt"))
        .respond_with(rpc_result(json!({
            "transactionHash": TX_HASH,
            "status": "0x1",
            "blockNumber": "0x2a",
            "gasUsed": "0x55730"
        })))
        .mount(&server)
        .await;

    let receipt = client(&server).safe_transfer(&request()).await.unwrap();
    assert_eq!(receipt.transaction_hash, TX_HASH);
    assert_eq!(receipt.block_number, 42);
    assert_eq!(receipt.gas_used, 350_000);
}

#[tokio::test]
async fn preflight_revert_is_classified_without_sending() {
    let server = MockServer::start().await;
    let revert_data = abi::to_hex(&abi::selector("SumcheckFailed()"));

    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_error("execution reverted", &revert_data))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    assert_eq!(
        err,
        SettlementError::VerificationFailed {
            reason: VerificationFailure::ConsistencyCheck,
            detail: "SumcheckFailed()".to_string(),
        }
    );
}

#[tokio::test]
async fn preflight_nullifier_revert_maps_to_nullifier_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_error("execution reverted: Nullifier already used", "0x"))
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    assert!(matches!(err, SettlementError::NullifierAlreadyUsed { .. }));
}

#[tokio::test]
async fn failed_receipt_is_reverted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_result(json!("0x")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_getTransactionReceipt"))
        .respond_with(rpc_result(json!({
            "status": "0x0",
            "blockNumber": "0x2b",
            "gasUsed": "0x5208"
        })))
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    assert_eq!(
        err,
        SettlementError::Reverted {
            tx_hash: TX_HASH.to_string()
        }
    );
}

#[tokio::test]
async fn missing_receipt_times_out_with_tx_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_result(json!("0x")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_getTransactionReceipt"))
        .respond_with(rpc_result(json!(null)))
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    match &err {
        SettlementError::ReceiptTimeout { tx_hash, .. } => assert_eq!(tx_hash, TX_HASH),
        other => panic!("expected ReceiptTimeout, got {other:?}"),
    }
    assert_eq!(err.transaction_hash(), Some(TX_HASH));
    assert_eq!(err.kind(), fincube_core::ErrorKind::ChainUnavailable);
}

#[tokio::test]
async fn node_failure_after_submission_keeps_the_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_call"))
        .respond_with(rpc_result(json!("0x")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("eth_getTransactionReceipt"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    assert!(
        matches!(&err, SettlementError::ReceiptUnavailable { tx_hash, .. } if tx_hash == TX_HASH),
        "{err:?}"
    );
    assert_eq!(err.transaction_hash(), Some(TX_HASH));
}

#[tokio::test]
async fn http_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).safe_transfer(&request()).await.unwrap_err();
    assert!(matches!(err, SettlementError::Unavailable(_)));
    assert_eq!(err.kind(), fincube_core::ErrorKind::ChainUnavailable);
}

#[tokio::test]
async fn view_calls_decode_results() {
    let server = MockServer::start().await;
    let is_used = abi::to_hex(&abi::selector("isNullifierUsed(bytes32)"));
    let approved = abi::to_hex(&abi::selector("isMemberApproved(address)"));
    let token = abi::to_hex(&abi::selector("approvedToken()"));

    Mock::given(method("POST"))
        .and(body_string_contains(format!("{is_used}{}067932", "00".repeat(29))))
        .respond_with(rpc_result(json!(word(1))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(format!("{approved}{}{}", "00".repeat(12), &RECEIVER[2..])))
        .respond_with(rpc_result(json!(word(0))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(token))
        .respond_with(rpc_result(json!(format!(
            "0x{}{}",
            "00".repeat(12),
            "dddddddddddddddddddddddddddddddddddddddd"
        ))))
        .mount(&server)
        .await;

    let c = client(&server);
    assert!(c.is_nullifier_used(&FieldElement::from_u64(424242)).await.unwrap());
    assert!(!c
        .is_organization_approved(&SettlementAddress::new(RECEIVER).unwrap())
        .await
        .unwrap());
    assert_eq!(
        c.approved_token().await.unwrap().as_str(),
        "0xdddddddddddddddddddddddddddddddddddddddd"
    );
}
