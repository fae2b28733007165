//! # Component Wiring
//!
//! Builds the ledger, proof pipeline, settlement client and audit sink a
//! command needs from [`FincubeConfig`] and the command-line switches.
//!
//! Without a database URL the ledger is in memory and is seeded from a
//! fixture file, which makes `prove` and `transfer` usable against a fresh
//! environment:
//!
//! ```yaml
//! organizations:
//!   - address: "0x00000000000000000000000000000000000000a1"
//!     members:
//!       - email: sender@a.example
//!         user_id: 2001
//!         balance: 900
//! ```
//!
//! Organizations get fresh salts on every seeding, so reference numbers and
//! secrets differ between runs.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fincube_batch::BatchManager;
use fincube_core::{IdentityKey, SettlementAddress, UserId};
use fincube_ledger::{init_pool, LedgerStore, MemoryLedger, PgLedger, User};
use fincube_settlement::{EvmSettlementClient, MockSettlementClient, SettlementClient};
use fincube_transfer::{EventSink, LogSink, WebhookSink};
use fincube_zkp::{MockToolchain, NargoToolchain, ProofPipeline, ProvingToolchain};
use serde::Deserialize;

use crate::config::FincubeConfig;

/// Token reported by the mock chain's `approvedToken()`.
const MOCK_TOKEN: &str = "0x000000000000000000000000000000000000c0de";
/// Signer used by the mock chain when no `chain.from_address` is set.
const MOCK_SIGNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub organizations: Vec<FixtureOrganization>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureOrganization {
    pub address: SettlementAddress,
    #[serde(default)]
    pub members: Vec<FixtureMember>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureMember {
    pub email: String,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub balance: u64,
}

impl Fixture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid fixture YAML in {}", path.display()))
    }
}

/// Register every organization and enroll every member of `fixture`.
///
/// Returns the enrolled users in fixture order.
pub async fn seed(ledger: Arc<dyn LedgerStore>, fixture: &Fixture) -> Result<Vec<User>> {
    let manager = BatchManager::new(ledger);
    let mut users = Vec::new();
    for entry in &fixture.organizations {
        let org = manager
            .register_organization(entry.address.clone())
            .await
            .with_context(|| format!("registering {}", entry.address))?;
        for member in &entry.members {
            let enrolled = manager
                .enroll(
                    &org,
                    IdentityKey::derive(&org.org_id, &member.email),
                    member.user_id,
                    member.balance,
                )
                .await
                .with_context(|| format!("enrolling {} into {}", member.email, entry.address))?;
            tracing::info!(
                user_id = %enrolled.user.user_id,
                reference = %enrolled.user.reference_number,
                balance = enrolled.user.balance,
                "fixture member enrolled"
            );
            users.push(enrolled.user);
        }
    }
    Ok(users)
}

/// PostgreSQL when a database URL is configured, otherwise an in-memory
/// ledger seeded from `fixture`.
pub async fn open_ledger(
    config: &FincubeConfig,
    fixture: Option<&Path>,
) -> Result<Arc<dyn LedgerStore>> {
    if let Some(pool) = init_pool(config.database_url.as_deref()).await? {
        if fixture.is_some() {
            tracing::warn!("--fixture ignored: a database URL is configured");
        }
        return Ok(Arc::new(PgLedger::new(pool)));
    }
    let ledger: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    match fixture {
        Some(path) => {
            let fixture = Fixture::from_file(path)?;
            seed(ledger.clone(), &fixture).await?;
        }
        None => tracing::warn!("in-memory ledger started empty; pass --fixture to seed it"),
    }
    Ok(ledger)
}

pub fn proof_pipeline(config: &FincubeConfig, mock: bool) -> Arc<ProofPipeline> {
    let pipeline_config = config.pipeline_config();
    let toolchain: Arc<dyn ProvingToolchain> = if mock {
        tracing::warn!("using the mock proving toolchain; proofs are not verifiable on-chain");
        Arc::new(MockToolchain::new())
    } else {
        Arc::new(NargoToolchain::new(pipeline_config.clone()))
    };
    Arc::new(ProofPipeline::new(toolchain, pipeline_config))
}

/// The EVM client from `chain`, or the in-process mock chain.
pub fn settlement_client(config: &FincubeConfig, mock: bool) -> Result<Arc<dyn SettlementClient>> {
    if mock {
        let signer = match config.signer_address()? {
            Some(addr) => addr,
            None => SettlementAddress::new(MOCK_SIGNER)?,
        };
        tracing::warn!(signer = %signer, "using the mock settlement chain");
        return Ok(Arc::new(MockSettlementClient::new(
            signer,
            SettlementAddress::new(MOCK_TOKEN)?,
        )));
    }
    match config.settlement_config()? {
        Some(evm) => Ok(Arc::new(EvmSettlementClient::new(evm)?)),
        None => bail!("chain.rpc_url is not configured; set it or pass --mock-chain"),
    }
}

pub fn event_sink(config: &FincubeConfig) -> Result<Arc<dyn EventSink>> {
    let events = config.event_config();
    match events.webhook_url {
        Some(url) => Ok(Arc::new(WebhookSink::new(url, events.request_timeout)?)),
        None => Ok(Arc::new(LogSink)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
organizations:
  - address: "0x00000000000000000000000000000000000000a1"
    members:
      - email: sender@a.example
        user_id: 2001
        balance: 900
      - email: colleague@a.example
  - address: "0x00000000000000000000000000000000000000B2"
    members:
      - email: receiver@b.example
        balance: 50
"#;

    #[tokio::test]
    async fn seed_enrolls_every_member() {
        let fixture: Fixture = serde_yaml::from_str(FIXTURE).unwrap();
        let ledger: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let users = seed(ledger.clone(), &fixture).await.unwrap();

        assert_eq!(users.len(), 3);
        assert_eq!(users[0].user_id.get(), 2001);
        assert_eq!(users[0].balance, 900);
        assert_eq!(users[1].balance, 0);
        assert!(users[2]
            .reference_number
            .as_str()
            .starts_with("0x00000000000000000000000000000000000000b2_"));
        let stored = ledger
            .get_user_by_reference(&users[2].reference_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, users[2].user_id);
    }

    #[test]
    fn fixture_rejects_bad_addresses() {
        let bad = "organizations:\n  - address: \"0x12\"\n";
        assert!(serde_yaml::from_str::<Fixture>(bad).is_err());
    }

    #[test]
    fn real_chain_requires_an_rpc_url() {
        let err = settlement_client(&FincubeConfig::default(), false)
            .err()
            .unwrap();
        assert!(err.to_string().contains("--mock-chain"));
        assert!(settlement_client(&FincubeConfig::default(), true).is_ok());
    }

    #[test]
    fn webhook_sink_is_chosen_when_configured() {
        let mut config = FincubeConfig::default();
        assert!(event_sink(&config).is_ok());
        config.events.webhook_url = Some("http://127.0.0.1:9/hook".into());
        assert!(event_sink(&config).is_ok());
    }
}
