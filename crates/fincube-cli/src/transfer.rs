//! # Transfer Subcommand
//!
//! Executes one transfer through the orchestrator and prints the outcome.
//!
//! Exit status: `0` settled, `2` partial (chain settled, ledger behind),
//! `1` failed. Failures print the typed error body; partial outcomes are
//! appended to the `--pending-file` backlog when one is given. Audit events
//! that could not be delivered are appended to `--dead-letter-file`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use fincube_core::UserId;
use fincube_transfer::{
    DeadLetterQueue, EventPublisher, ReconciliationQueue, TransferOrchestrator, TransferOutcome,
    TransferRequest,
};

use crate::config::FincubeConfig;
use crate::events::{load_dead_letters, save_dead_letters};
use crate::reconcile::{load_pending, save_pending};
use crate::runtime::{event_sink, open_ledger, proof_pipeline, settlement_client};

/// Arguments for `fincube transfer`.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Paying user.
    #[arg(long)]
    pub sender_user_id: i64,

    /// Receiver's public reference number.
    #[arg(
        long,
        conflicts_with = "receiver_user_id",
        required_unless_present = "receiver_user_id"
    )]
    pub receiver_reference: Option<String>,

    /// Look the receiver's reference number up by user id instead.
    #[arg(long)]
    pub receiver_user_id: Option<i64>,

    /// Amount in whole token units.
    #[arg(long)]
    pub amount: f64,

    /// Seed the in-memory ledger from this YAML fixture.
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Append partial outcomes to this reconciliation backlog.
    #[arg(long)]
    pub pending_file: Option<PathBuf>,

    /// Append undelivered audit events to this backlog.
    #[arg(long)]
    pub dead_letter_file: Option<PathBuf>,

    /// Use the in-process mock toolchain instead of nargo and bb.
    #[arg(long)]
    pub mock_prover: bool,

    /// Use the in-process mock chain instead of the configured RPC node.
    #[arg(long)]
    pub mock_chain: bool,
}

pub async fn run_transfer(args: &TransferArgs, config: &FincubeConfig) -> Result<u8> {
    let ledger = open_ledger(config, args.fixture.as_deref()).await?;

    let receiver_reference = match (&args.receiver_reference, args.receiver_user_id) {
        (Some(reference), _) => reference.clone(),
        (None, Some(id)) => {
            let user_id = UserId::new(id).context("--receiver-user-id")?;
            ledger
                .get_user(user_id)
                .await?
                .with_context(|| format!("receiver user {id} not found"))?
                .reference_number
                .to_string()
        }
        (None, None) => anyhow::bail!("--receiver-reference or --receiver-user-id is required"),
    };

    let backlog = match &args.pending_file {
        Some(path) => load_pending(path)?,
        None => Vec::new(),
    };
    let queue = Arc::new(ReconciliationQueue::restore(backlog));

    let dead_letters = Arc::new(DeadLetterQueue::restore(match &args.dead_letter_file {
        Some(path) => load_dead_letters(path)?,
        None => Vec::new(),
    }));
    let (publisher, delivery) = EventPublisher::spawn_with_dead_letters(
        event_sink(config)?,
        &config.event_config(),
        dead_letters.clone(),
    );
    let orchestrator = TransferOrchestrator::new(
        ledger,
        proof_pipeline(config, args.mock_prover),
        settlement_client(config, args.mock_chain)?,
        config.transfer_config(),
    )
    .with_events(publisher)
    .with_reconciliation(queue.clone());

    let request = TransferRequest::new(receiver_reference, args.amount, args.sender_user_id);
    let result = orchestrator.execute_transfer(&request).await;

    // Close the event channel and let queued audit events drain.
    drop(orchestrator);
    if let Err(e) = delivery.await {
        tracing::warn!("audit event delivery task ended abnormally: {e}");
    }
    if !dead_letters.is_empty() {
        match &args.dead_letter_file {
            Some(path) => {
                save_dead_letters(path, &dead_letters.list())?;
                tracing::warn!(
                    count = dead_letters.len(),
                    path = %path.display(),
                    "undelivered audit events saved for replay"
                );
            }
            None => tracing::warn!(
                count = dead_letters.len(),
                "undelivered audit events not persisted; rerun with --dead-letter-file to keep them"
            ),
        }
    }

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            match &report.outcome {
                TransferOutcome::Partial { pending_id, .. } => {
                    match &args.pending_file {
                        Some(path) => {
                            save_pending(path, &queue.list())?;
                            tracing::warn!(
                                %pending_id,
                                path = %path.display(),
                                "ledger update saved for reconciliation"
                            );
                        }
                        None => tracing::warn!(
                            %pending_id,
                            "ledger update not persisted; rerun with --pending-file to keep a backlog"
                        ),
                    }
                    Ok(2)
                }
                _ => Ok(0),
            }
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.detail())?);
            tracing::error!("{err}");
            Ok(1)
        }
    }
}
