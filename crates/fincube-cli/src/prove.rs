//! # Prove Subcommand
//!
//! Runs the proof pipeline once on a prover-inputs JSON file and prints
//! the contract-shaped proof. On a stage failure the full diagnostics
//! (exit code, stdout, stderr, staged inputs) are printed as JSON and the
//! command exits with status 1.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fincube_zkp::ProverInputs;

use crate::config::FincubeConfig;
use crate::runtime::proof_pipeline;

/// Arguments for `fincube prove`.
#[derive(Args, Debug)]
pub struct ProveArgs {
    /// JSON file with `secret`, `coefficients`, `commitment_hash`,
    /// `verifier_key`, `nullifier` and `is_verified_member`.
    #[arg(long)]
    pub inputs: PathBuf,

    /// Write the proof JSON here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Use the in-process mock toolchain instead of nargo and bb.
    #[arg(long)]
    pub mock_prover: bool,
}

pub async fn run_prove(args: &ProveArgs, config: &FincubeConfig) -> Result<u8> {
    let content = std::fs::read_to_string(&args.inputs)
        .with_context(|| format!("reading {}", args.inputs.display()))?;
    let inputs: ProverInputs = serde_json::from_str(&content)
        .with_context(|| format!("invalid prover inputs in {}", args.inputs.display()))?;

    let pipeline = proof_pipeline(config, args.mock_prover);
    let proof = match pipeline.generate(&inputs).await {
        Ok(proof) => proof,
        Err(err) => {
            tracing::error!(kind = %err.kind(), "proof generation failed: {err}");
            if let Some(diagnostics) = err.diagnostics() {
                println!("{}", serde_json::to_string_pretty(diagnostics)?);
            }
            return Ok(1);
        }
    };

    let json = serde_json::to_string_pretty(&proof)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "proof written");
        }
        None => println!("{json}"),
    }
    Ok(0)
}
