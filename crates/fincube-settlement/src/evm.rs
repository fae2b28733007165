//! # EVM JSON-RPC Settlement Client
//!
//! Talks to the FinCube, verifier and governance contracts on an
//! EVM-compatible chain over JSON-RPC.
//!
//! ## How It Works
//!
//! 1. Reads (`verify`, `isNullifierUsed`, `approvedToken`,
//!    `isMemberApproved`) are `eth_call`s against `latest`.
//! 2. `safeTransfer` is first simulated with `eth_call`, so a revert is
//!    classified from its revert data without spending gas, then sent with
//!    `eth_sendTransaction`.
//! 3. The receipt is polled with `eth_getTransactionReceipt` until it
//!    appears or the receipt timeout expires.
//!
//! ## Security
//!
//! - The client holds no private keys. The node signs for `from_address`
//!   (HSM, KMS, or an unlocked account).
//! - A submitted transaction is never resubmitted. A missing receipt is
//!   reported as `ReceiptTimeout` or `ReceiptUnavailable`, both carrying the
//!   transaction hash so an operator can follow up.

use std::time::Duration;

use async_trait::async_trait;
use fincube_core::{FieldElement, SettlementAddress};
use serde_json::{json, Value};

use crate::abi::{self, Token};
use crate::client::{ChainReceipt, SettlementClient, SettlementRequest};
use crate::error::SettlementError;
use crate::revert::classify_revert;

const SAFE_TRANSFER_SIG: &str =
    "safeTransfer(address,uint256,string,bytes32,string,string,bytes,bytes32[])";
const VERIFY_SIG: &str = "verify(bytes,bytes32[])";
const IS_NULLIFIER_USED_SIG: &str = "isNullifierUsed(bytes32)";
const APPROVED_TOKEN_SIG: &str = "approvedToken()";
const IS_MEMBER_APPROVED_SIG: &str = "isMemberApproved(address)";

/// Configuration for the EVM settlement client.
#[derive(Debug, Clone)]
pub struct EvmSettlementConfig {
    /// JSON-RPC endpoint URL (must be HTTPS in production).
    pub rpc_url: String,
    /// FinCube settlement contract.
    pub contract_address: SettlementAddress,
    /// Proof verifier contract.
    pub verifier_address: SettlementAddress,
    /// Governance (membership voting) contract.
    pub governance_address: SettlementAddress,
    /// Account the node signs settlement transactions for.
    pub from_address: SettlementAddress,
    /// EVM chain ID.
    pub chain_id: u64,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How long to wait for a receipt after submission.
    pub receipt_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Explicit gas limit; the node estimates when `None`.
    pub gas_limit: Option<u64>,
}

impl EvmSettlementConfig {
    /// Create a configuration where the verifier and governance contracts
    /// share the settlement contract's address.
    ///
    /// Defaults: 30 s request timeout, 120 s receipt timeout, 2 s polling.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: SettlementAddress,
        from_address: SettlementAddress,
        chain_id: u64,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            verifier_address: contract_address.clone(),
            governance_address: contract_address.clone(),
            contract_address,
            from_address,
            chain_id,
            request_timeout: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            gas_limit: None,
        }
    }

    pub fn with_verifier(mut self, address: SettlementAddress) -> Self {
        self.verifier_address = address;
        self
    }

    pub fn with_governance(mut self, address: SettlementAddress) -> Self {
        self.governance_address = address;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long and how often to poll for a receipt.
    pub fn with_receipt_polling(mut self, timeout: Duration, interval: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.poll_interval = interval;
        self
    }

    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }
}

/// A JSON-RPC failure before classification.
#[derive(Debug)]
enum RpcFailure {
    /// Transport, HTTP status, or malformed envelope.
    Transport(String),
    /// The node answered with a JSON-RPC `error` object.
    Node {
        message: String,
        data: Option<Vec<u8>>,
    },
}

#[derive(Debug)]
pub struct EvmSettlementClient {
    client: reqwest::Client,
    config: EvmSettlementConfig,
}

impl EvmSettlementClient {
    pub fn new(config: EvmSettlementConfig) -> Result<Self, SettlementError> {
        if config.rpc_url.is_empty() {
            return Err(SettlementError::Config("rpc_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SettlementError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EvmSettlementConfig {
        &self.config
    }

    /// Send a JSON-RPC request and return the result field.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcFailure::Transport(format!("{method}: request timed out"))
                } else {
                    RpcFailure::Transport(format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(RpcFailure::Transport(format!(
                "{method}: HTTP {}",
                resp.status()
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            let data = error
                .get("data")
                .and_then(|d| d.as_str().or_else(|| d.get("data").and_then(Value::as_str)))
                .and_then(|s| abi::from_hex(s).ok());
            return Err(RpcFailure::Node { message, data });
        }

        json.get("result").cloned().ok_or_else(|| {
            RpcFailure::Transport(format!("{method}: JSON-RPC response missing 'result' field"))
        })
    }

    /// `eth_call` against `latest`, returning the raw return data.
    async fn eth_call(
        &self,
        to: &SettlementAddress,
        data: &[u8],
    ) -> Result<Vec<u8>, RpcFailure> {
        let call = json!({
            "from": self.config.from_address.as_str(),
            "to": to.as_str(),
            "data": abi::to_hex(data),
        });
        let result = self.rpc_call("eth_call", json!([call, "latest"])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| RpcFailure::Transport("eth_call returned non-string result".into()))?;
        abi::from_hex(hex)
            .map_err(|e| RpcFailure::Transport(format!("eth_call returned invalid hex: {e}")))
    }

    /// A read that should never revert; any failure is unavailability.
    async fn read(&self, to: &SettlementAddress, data: &[u8]) -> Result<Vec<u8>, SettlementError> {
        self.eth_call(to, data).await.map_err(|f| match f {
            RpcFailure::Transport(m) => SettlementError::Unavailable(m),
            RpcFailure::Node { message, .. } => SettlementError::Rejected(message),
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<ChainReceipt, SettlementError> {
        let deadline = tokio::time::Instant::now() + self.config.receipt_timeout;
        loop {
            let receipt = self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .map_err(|f| match f {
                    RpcFailure::Transport(reason) | RpcFailure::Node { message: reason, .. } => {
                        SettlementError::ReceiptUnavailable {
                            tx_hash: tx_hash.to_string(),
                            reason,
                        }
                    }
                })?;

            if !receipt.is_null() {
                return parse_receipt(tx_hash, &receipt);
            }
            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                return Err(SettlementError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: self.config.receipt_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn parse_hex_u64(v: Option<&Value>) -> Option<u64> {
    v.and_then(Value::as_str)
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
}

fn parse_receipt(tx_hash: &str, receipt: &Value) -> Result<ChainReceipt, SettlementError> {
    let status = receipt
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("0x0");
    if status == "0x0" {
        return Err(SettlementError::Reverted {
            tx_hash: tx_hash.to_string(),
        });
    }
    let block_number = parse_hex_u64(receipt.get("blockNumber")).ok_or_else(|| {
        SettlementError::Unavailable(format!("receipt for {tx_hash} has no blockNumber"))
    })?;
    let gas_used = parse_hex_u64(receipt.get("gasUsed")).unwrap_or(0);
    Ok(ChainReceipt {
        transaction_hash: tx_hash.to_string(),
        block_number,
        gas_used,
    })
}

fn bytes32_list(inputs: &[FieldElement]) -> Token {
    Token::Bytes32Array(inputs.iter().map(FieldElement::to_be_bytes).collect())
}

/// Calldata for `safeTransfer`.
pub fn encode_safe_transfer(request: &SettlementRequest) -> Vec<u8> {
    abi::encode_call(
        SAFE_TRANSFER_SIG,
        &[
            Token::Address(request.to.to_bytes()),
            Token::Uint(request.amount),
            Token::String(request.memo.clone()),
            Token::Bytes32(request.nullifier.to_be_bytes()),
            Token::String(request.sender_reference.to_string()),
            Token::String(request.receiver_reference.to_string()),
            Token::Bytes(request.proof.clone()),
            bytes32_list(&request.public_inputs),
        ],
    )
}

#[async_trait]
impl SettlementClient for EvmSettlementClient {
    async fn verify(
        &self,
        proof: &[u8],
        public_inputs: &[FieldElement],
    ) -> Result<bool, SettlementError> {
        let data = abi::encode_call(
            VERIFY_SIG,
            &[Token::Bytes(proof.to_vec()), bytes32_list(public_inputs)],
        );
        match self.eth_call(&self.config.verifier_address, &data).await {
            Ok(ret) => abi::decode_bool(&ret).ok_or_else(|| {
                SettlementError::Unavailable("verify returned a non-bool value".to_string())
            }),
            Err(RpcFailure::Transport(m)) => Err(SettlementError::Unavailable(m)),
            Err(RpcFailure::Node { message, data }) => {
                Err(classify_revert(&message, data.as_deref(), ""))
            }
        }
    }

    async fn safe_transfer(
        &self,
        request: &SettlementRequest,
    ) -> Result<ChainReceipt, SettlementError> {
        let data = encode_safe_transfer(request);
        let nullifier_hex = request.nullifier.to_hex();
        let classify = |f: RpcFailure| match f {
            RpcFailure::Transport(m) => SettlementError::Unavailable(m),
            RpcFailure::Node { message, data } => {
                classify_revert(&message, data.as_deref(), &nullifier_hex)
            }
        };

        // Simulate first: a revert here costs nothing and carries its reason.
        self.eth_call(&self.config.contract_address, &data)
            .await
            .map_err(&classify)?;

        let mut tx = json!({
            "from": self.config.from_address.as_str(),
            "to": self.config.contract_address.as_str(),
            "data": abi::to_hex(&data),
        });
        if let Some(gas) = self.config.gas_limit {
            tx["gas"] = json!(format!("0x{gas:x}"));
        }
        let result = self
            .rpc_call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(&classify)?;
        let tx_hash = result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                SettlementError::Unavailable(
                    "eth_sendTransaction returned non-string result".to_string(),
                )
            })?;
        tracing::info!(
            tx_hash = %tx_hash,
            chain_id = self.config.chain_id,
            to = %request.to,
            "settlement transaction submitted"
        );

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        tracing::info!(
            tx_hash = %receipt.transaction_hash,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            "settlement transaction mined"
        );
        Ok(receipt)
    }

    async fn is_organization_approved(
        &self,
        address: &SettlementAddress,
    ) -> Result<bool, SettlementError> {
        let data = abi::encode_call(IS_MEMBER_APPROVED_SIG, &[Token::Address(address.to_bytes())]);
        let ret = self.read(&self.config.governance_address, &data).await?;
        abi::decode_bool(&ret).ok_or_else(|| {
            SettlementError::Unavailable("isMemberApproved returned a non-bool value".to_string())
        })
    }

    async fn approved_token(&self) -> Result<SettlementAddress, SettlementError> {
        let data = abi::encode_call(APPROVED_TOKEN_SIG, &[]);
        let ret = self.read(&self.config.contract_address, &data).await?;
        let raw = abi::decode_address(&ret).ok_or_else(|| {
            SettlementError::Unavailable("approvedToken returned a non-address value".to_string())
        })?;
        SettlementAddress::new(format!("0x{}", hex::encode(raw)))
            .map_err(|e| SettlementError::Unavailable(e.to_string()))
    }

    async fn is_nullifier_used(&self, nullifier: &FieldElement) -> Result<bool, SettlementError> {
        let data = abi::encode_call(IS_NULLIFIER_USED_SIG, &[Token::Bytes32(nullifier.to_be_bytes())]);
        let ret = self.read(&self.config.contract_address, &data).await?;
        abi::decode_bool(&ret).ok_or_else(|| {
            SettlementError::Unavailable("isNullifierUsed returned a non-bool value".to_string())
        })
    }

    fn signer_address(&self) -> &SettlementAddress {
        &self.config.from_address
    }

    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: &str) -> SettlementAddress {
        SettlementAddress::new(format!("0x{}", tag.repeat(40 / tag.len()))).unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = EvmSettlementConfig::new("https://rpc.example.com", addr("1"), addr("2"), 31337);
        assert_eq!(config.verifier_address, config.contract_address);
        assert_eq!(config.governance_address, config.contract_address);
        assert_eq!(config.receipt_timeout, Duration::from_secs(120));
        assert!(config.gas_limit.is_none());
    }

    #[test]
    fn config_builders() {
        let config = EvmSettlementConfig::new("https://rpc.example.com", addr("1"), addr("2"), 1)
            .with_verifier(addr("3"))
            .with_governance(addr("4"))
            .with_gas_limit(3_000_000);
        assert_eq!(config.verifier_address, addr("3"));
        assert_eq!(config.governance_address, addr("4"));
        assert_eq!(config.gas_limit, Some(3_000_000));
    }

    #[test]
    fn empty_rpc_url_is_rejected() {
        let config = EvmSettlementConfig::new("", addr("1"), addr("2"), 1);
        assert!(matches!(
            EvmSettlementClient::new(config),
            Err(SettlementError::Config(_))
        ));
    }

    #[test]
    fn reverted_receipt_is_an_error() {
        let r = json!({"status": "0x0", "blockNumber": "0x10", "gasUsed": "0x1"});
        assert!(matches!(
            parse_receipt("0xabc", &r),
            Err(SettlementError::Reverted { .. })
        ));
        let ok = json!({"status": "0x1", "blockNumber": "0x10", "gasUsed": "0x5208"});
        let receipt = parse_receipt("0xabc", &ok).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21000);
    }
}
