//! # Reconcile Subcommand
//!
//! Works through the backlog of ledger updates left behind by `PARTIAL`
//! transfers. The backlog is a JSON file written by `fincube transfer
//! --pending-file`; entries that apply are removed from it, entries that
//! still fail stay with their new error and attempt count.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use fincube_transfer::{PendingLedgerUpdate, ReconcileError, ReconciliationQueue};
use uuid::Uuid;

use crate::config::FincubeConfig;
use crate::runtime::open_ledger;

/// Arguments for `fincube reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Backlog file written by `fincube transfer --pending-file`.
    #[arg(long)]
    pub pending_file: PathBuf,

    /// Apply only this entry.
    #[arg(long, conflicts_with = "list")]
    pub id: Option<Uuid>,

    /// Print the backlog without applying anything.
    #[arg(long)]
    pub list: bool,

    /// Seed the in-memory ledger from this YAML fixture.
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

/// Read a backlog file. A missing file is an empty backlog.
pub fn load_pending(path: &Path) -> Result<Vec<PendingLedgerUpdate>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid pending-update backlog in {}", path.display()))
}

pub fn save_pending(path: &Path, entries: &[PendingLedgerUpdate]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub async fn run_reconcile(args: &ReconcileArgs, config: &FincubeConfig) -> Result<u8> {
    let queue = ReconciliationQueue::restore(load_pending(&args.pending_file)?);
    if args.list {
        println!("{}", serde_json::to_string_pretty(&queue.list())?);
        return Ok(0);
    }
    if queue.is_empty() {
        tracing::info!("nothing to reconcile");
        return Ok(0);
    }

    let ledger = open_ledger(config, args.fixture.as_deref()).await?;
    let code = match args.id {
        Some(id) => match queue.reconcile(ledger.as_ref(), id).await {
            Ok(balances) => {
                println!("{}", serde_json::to_string_pretty(&balances)?);
                0
            }
            Err(ReconcileError::NotFound(id)) => {
                tracing::error!(%id, "no such pending update");
                1
            }
            Err(err @ (ReconcileError::Ledger { .. } | ReconcileError::InFlight(_))) => {
                tracing::error!("{err}");
                1
            }
        },
        None => {
            let report = queue.reconcile_all(ledger.as_ref()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            u8::from(!report.failed.is_empty())
        }
    };

    save_pending(&args.pending_file, &queue.list())?;
    tracing::info!(remaining = queue.len(), "backlog saved");
    Ok(code)
}
