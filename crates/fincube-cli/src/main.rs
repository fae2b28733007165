//! # fincube CLI entry point
//!
//! Parses command-line arguments, loads configuration and dispatches to
//! the subcommand handlers in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fincube_cli::config::FincubeConfig;
use fincube_cli::derive::{
    run_commitment, run_nullifier, run_secret, CommitmentArgs, NullifierArgs, SecretArgs,
};
use fincube_cli::events::{run_replay_events, ReplayEventsArgs};
use fincube_cli::memo::{run_memo, MemoArgs};
use fincube_cli::prove::{run_prove, ProveArgs};
use fincube_cli::reconcile::{run_reconcile, ReconcileArgs};
use fincube_cli::transfer::{run_transfer, TransferArgs};

/// FinCube settlement engine CLI
///
/// Membership proofs, nullifiers and settlement memos for cross-organization
/// transfers, plus the operator surface for partial-settlement reconciliation.
#[derive(Parser, Debug)]
#[command(name = "fincube", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive a member secret from its identity key and organization salt.
    Secret(SecretArgs),

    /// Compute the nullifier a secret yields towards a paying organization.
    Nullifier(NullifierArgs),

    /// Compute the commitment hash of a batch polynomial.
    Commitment(CommitmentArgs),

    /// Encode and size-check a settlement memo.
    Memo(MemoArgs),

    /// Generate a membership proof from a prover-inputs file.
    Prove(ProveArgs),

    /// Execute one transfer.
    Transfer(TransferArgs),

    /// Apply ledger updates left behind by partial transfers.
    Reconcile(ReconcileArgs),

    /// Deliver audit events left in a dead-letter backlog.
    ReplayEvents(ReplayEventsArgs),
}

fn init_tracing(verbose: u8) {
    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let json = std::env::var("FINCUBE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!("fincube CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match FincubeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Commands::Secret(args) => run_secret(&args),
        Commands::Nullifier(args) => run_nullifier(&args),
        Commands::Commitment(args) => run_commitment(&args),
        Commands::Memo(args) => run_memo(&args, &config),
        Commands::Prove(args) => run_prove(&args, &config).await,
        Commands::Transfer(args) => run_transfer(&args, &config).await,
        Commands::Reconcile(args) => run_reconcile(&args, &config).await,
        Commands::ReplayEvents(args) => run_replay_events(&args, &config).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
