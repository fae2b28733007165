//! # Replay-Events Subcommand
//!
//! Delivers audit events that never reached their sink. The backlog is a
//! JSON file written by `fincube transfer --dead-letter-file`; delivered
//! events are removed from it, the rest stay with their new reason.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use fincube_transfer::{DeadLetterQueue, UndeliveredEvent};

use crate::config::FincubeConfig;
use crate::runtime::event_sink;

/// Arguments for `fincube replay-events`.
#[derive(Args, Debug)]
pub struct ReplayEventsArgs {
    /// Backlog file written by `fincube transfer --dead-letter-file`.
    #[arg(long)]
    pub dead_letter_file: PathBuf,

    /// Print the backlog without delivering anything.
    #[arg(long)]
    pub list: bool,
}

/// Read a dead-letter file. A missing file is an empty backlog.
pub fn load_dead_letters(path: &Path) -> Result<Vec<UndeliveredEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid audit-event backlog in {}", path.display()))
}

pub fn save_dead_letters(path: &Path, entries: &[UndeliveredEvent]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub async fn run_replay_events(args: &ReplayEventsArgs, config: &FincubeConfig) -> Result<u8> {
    let queue = DeadLetterQueue::restore(load_dead_letters(&args.dead_letter_file)?);
    if args.list {
        println!("{}", serde_json::to_string_pretty(&queue.list())?);
        return Ok(0);
    }
    if queue.is_empty() {
        tracing::info!("no undelivered audit events");
        return Ok(0);
    }

    let sink = event_sink(config)?;
    let report = queue.replay(sink.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    save_dead_letters(&args.dead_letter_file, &queue.list())?;
    tracing::info!(remaining = queue.len(), "audit-event backlog saved");
    Ok(u8::from(!report.failed.is_empty()))
}
