//! # Memo Subcommand
//!
//! Encodes a settlement memo exactly as a cross-organization transfer
//! would and prints the canonical JSON. Fails with the size and limit when
//! the encoding is over the configured bound, so an operator can check a
//! pair of reference numbers before submitting.

use anyhow::{Context, Result};
use clap::Args;
use fincube_core::{ReferenceNumber, Timestamp};
use fincube_settlement::SettlementMemo;

use crate::config::FincubeConfig;

/// Arguments for `fincube memo`.
#[derive(Args, Debug)]
pub struct MemoArgs {
    /// Sender reference number.
    #[arg(long)]
    pub sender_ref: String,

    /// Receiver reference number.
    #[arg(long)]
    pub receiver_ref: String,

    /// Amount in whole token units.
    #[arg(long)]
    pub amount: u64,

    /// RFC 3339 UTC timestamp (`Z` suffix). Defaults to now.
    #[arg(long)]
    pub timestamp: Option<String>,
}

pub fn build_memo(args: &MemoArgs, max_bytes: usize) -> Result<String> {
    let sender = ReferenceNumber::new(args.sender_ref.as_str()).context("--sender-ref")?;
    let receiver = ReferenceNumber::new(args.receiver_ref.as_str()).context("--receiver-ref")?;
    let timestamp = match &args.timestamp {
        Some(raw) => Timestamp::parse(raw).context("--timestamp")?,
        None => Timestamp::now(),
    };
    let memo = SettlementMemo::new(
        sender.clone(),
        receiver.clone(),
        sender.settlement_address(),
        receiver.settlement_address(),
        args.amount,
        timestamp,
    );
    Ok(memo.encode_bounded(max_bytes)?)
}

pub fn run_memo(args: &MemoArgs, config: &FincubeConfig) -> Result<u8> {
    let encoded = build_memo(args, config.transfer.memo_max_bytes)?;
    tracing::info!(bytes = encoded.len(), "memo encoded");
    println!("{encoded}");
    Ok(0)
}
