//! # Operator Configuration
//!
//! `fincube.yaml` holds one section per component. Every section and every
//! field has a default, so an empty file (or no file) is a valid
//! configuration: in-memory ledger, no chain client, nargo and bb from
//! `PATH`.
//!
//! ## Environment overrides
//!
//! Applied after the file is read:
//!
//! | Variable | Field |
//! |---|---|
//! | `DATABASE_URL` | `database_url` |
//! | `FINCUBE_RPC_URL` | `chain.rpc_url` |
//! | `FINCUBE_FROM_ADDRESS` | `chain.from_address` |
//! | `FINCUBE_CONTRACT_ADDRESS` | `chain.contract_address` |
//!
//! Addresses are validated when the component configs are built, not when
//! the file is parsed, so `fincube secret` works with a half-filled file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fincube_core::{SettlementAddress, ValidationError};
use fincube_settlement::{EvmSettlementConfig, MEMO_MAX_BYTES};
use fincube_transfer::{EventConfig, TransferConfig};
use fincube_zkp::PipelineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("chain.{field}: {source}")]
    InvalidAddress {
        field: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("chain.{0} is required when chain.rpc_url is set")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FincubeConfig {
    /// PostgreSQL URL. In-memory ledger when absent.
    pub database_url: Option<String>,
    pub chain: ChainSection,
    pub prover: ProverSection,
    pub transfer: TransferSection,
    pub events: EventsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainSection {
    pub rpc_url: Option<String>,
    pub chain_id: u64,
    pub contract_address: Option<String>,
    pub verifier_address: Option<String>,
    pub governance_address: Option<String>,
    pub from_address: Option<String>,
    pub request_timeout_secs: u64,
    pub receipt_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub gas_limit: Option<u64>,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            rpc_url: None,
            chain_id: 31337,
            contract_address: None,
            verifier_address: None,
            governance_address: None,
            from_address: None,
            request_timeout_secs: 30,
            receipt_timeout_secs: 120,
            poll_interval_secs: 2,
            gas_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProverSection {
    pub circuit_dir: PathBuf,
    pub circuit_name: String,
    pub nargo_binary: PathBuf,
    pub bb_binary: PathBuf,
    pub stage_timeout_secs: u64,
    pub max_concurrent_proofs: usize,
    pub scratch_root: Option<PathBuf>,
}

impl Default for ProverSection {
    fn default() -> Self {
        Self {
            circuit_dir: PathBuf::from("circuits/membership"),
            circuit_name: "membership".to_string(),
            nargo_binary: PathBuf::from("nargo"),
            bb_binary: PathBuf::from("bb"),
            stage_timeout_secs: 120,
            max_concurrent_proofs: 4,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    pub memo_max_bytes: usize,
    pub token_decimals: u32,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            memo_max_bytes: MEMO_MAX_BYTES,
            token_decimals: 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsSection {
    /// Audit events are POSTed here. Logged only when absent.
    pub webhook_url: Option<String>,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            queue_capacity: 1024,
            max_attempts: 4,
            base_delay_ms: 200,
            request_timeout_secs: 10,
        }
    }
}

impl FincubeConfig {
    /// Read `path`, or start from defaults when no path is given, then
    /// apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply the overrides in the module table, reading variables through
    /// `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = get("FINCUBE_RPC_URL") {
            self.chain.rpc_url = Some(url);
        }
        if let Some(addr) = get("FINCUBE_FROM_ADDRESS") {
            self.chain.from_address = Some(addr);
        }
        if let Some(addr) = get("FINCUBE_CONTRACT_ADDRESS") {
            self.chain.contract_address = Some(addr);
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let p = &self.prover;
        let mut config = PipelineConfig::new(&p.circuit_dir)
            .with_circuit_name(&p.circuit_name)
            .with_nargo_binary(&p.nargo_binary)
            .with_bb_binary(&p.bb_binary)
            .with_stage_timeout(Duration::from_secs(p.stage_timeout_secs))
            .with_max_concurrent_proofs(p.max_concurrent_proofs);
        if let Some(root) = &p.scratch_root {
            config = config.with_scratch_root(root);
        }
        config
    }

    /// The EVM client configuration, or `None` when no RPC URL is set.
    pub fn settlement_config(&self) -> Result<Option<EvmSettlementConfig>, ConfigError> {
        let c = &self.chain;
        let Some(rpc_url) = c.rpc_url.as_deref() else {
            return Ok(None);
        };
        let contract = required_address("contract_address", c.contract_address.as_deref())?;
        let from = required_address("from_address", c.from_address.as_deref())?;

        let mut config = EvmSettlementConfig::new(rpc_url, contract, from, c.chain_id)
            .with_request_timeout(Duration::from_secs(c.request_timeout_secs))
            .with_receipt_polling(
                Duration::from_secs(c.receipt_timeout_secs),
                Duration::from_secs(c.poll_interval_secs),
            );
        if let Some(raw) = c.verifier_address.as_deref() {
            config = config.with_verifier(address("verifier_address", raw)?);
        }
        if let Some(raw) = c.governance_address.as_deref() {
            config = config.with_governance(address("governance_address", raw)?);
        }
        if let Some(gas) = c.gas_limit {
            config = config.with_gas_limit(gas);
        }
        Ok(Some(config))
    }

    /// The from address, needed by the mock chain client as its signer.
    pub fn signer_address(&self) -> Result<Option<SettlementAddress>, ConfigError> {
        self.chain
            .from_address
            .as_deref()
            .map(|raw| address("from_address", raw))
            .transpose()
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig::new()
            .with_memo_max_bytes(self.transfer.memo_max_bytes)
            .with_token_decimals(self.transfer.token_decimals)
    }

    pub fn event_config(&self) -> EventConfig {
        let e = &self.events;
        let mut config = EventConfig::new()
            .with_queue_capacity(e.queue_capacity)
            .with_retry(e.max_attempts, Duration::from_millis(e.base_delay_ms));
        config.request_timeout = Duration::from_secs(e.request_timeout_secs);
        if let Some(url) = &e.webhook_url {
            config = config.with_webhook_url(url);
        }
        config
    }
}

fn address(field: &'static str, raw: &str) -> Result<SettlementAddress, ConfigError> {
    SettlementAddress::new(raw).map_err(|source| ConfigError::InvalidAddress { field, source })
}

fn required_address(
    field: &'static str,
    raw: Option<&str>,
) -> Result<SettlementAddress, ConfigError> {
    address(field, raw.ok_or(ConfigError::MissingField(field))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
    const FROM: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn empty_document_is_all_defaults() {
        let config = FincubeConfig::from_yaml("").unwrap();
        assert_eq!(config, FincubeConfig::default());
        assert!(config.settlement_config().unwrap().is_none());
        assert_eq!(config.transfer_config().token_decimals, 18);
        assert_eq!(config.pipeline_config().max_concurrent_proofs, 4);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "prover:\n  max_concurrent_proofs: 2\nevents:\n  base_delay_ms: 50\n";
        let config = FincubeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.prover.max_concurrent_proofs, 2);
        assert_eq!(config.prover.circuit_name, "membership");
        assert_eq!(config.event_config().base_delay, Duration::from_millis(50));
        assert_eq!(config.event_config().max_attempts, 4);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FincubeConfig::from_yaml("chain:\n  rpc: http://x\n").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = FincubeConfig::from_yaml(
            "database_url: postgres://file\nchain:\n  rpc_url: http://file:8545\n",
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://env"),
            ("FINCUBE_RPC_URL", ""),
            ("FINCUBE_CONTRACT_ADDRESS", CONTRACT),
            ("FINCUBE_FROM_ADDRESS", FROM),
        ]
        .into_iter()
        .collect();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_url.as_deref(), Some("postgres://env"));
        assert_eq!(config.chain.rpc_url.as_deref(), Some("http://file:8545"));
        let evm = config.settlement_config().unwrap().unwrap();
        assert_eq!(evm.contract_address.as_str(), CONTRACT);
        assert_eq!(evm.verifier_address.as_str(), CONTRACT);
        assert_eq!(evm.from_address.as_str(), FROM);
    }

    #[test]
    fn rpc_url_without_addresses_is_an_error() {
        let config = FincubeConfig::from_yaml("chain:\n  rpc_url: http://localhost:8545\n").unwrap();
        assert!(matches!(
            config.settlement_config(),
            Err(ConfigError::MissingField("contract_address"))
        ));
    }

    #[test]
    fn malformed_address_names_the_field() {
        let yaml = format!(
            "chain:\n  rpc_url: http://localhost:8545\n  contract_address: {CONTRACT}\n  from_address: {FROM}\n  governance_address: 0x1234\n"
        );
        let err = FincubeConfig::from_yaml(&yaml)
            .unwrap()
            .settlement_config()
            .unwrap_err();
        assert!(err.to_string().starts_with("chain.governance_address"));
    }

    #[test]
    fn from_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fincube.yaml");
        std::fs::write(&path, "transfer:\n  token_decimals: [1]\n").unwrap();
        let err = FincubeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("fincube.yaml"));
    }

    #[test]
    fn example_config_is_the_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/fincube.example.yaml");
        assert_eq!(FincubeConfig::from_file(&path).unwrap(), FincubeConfig::default());
    }
}
