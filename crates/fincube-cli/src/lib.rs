//! # fincube-cli — Operator CLI for the FinCube Engine
//!
//! Provides the `fincube` command-line interface.
//!
//! ## Subcommands
//!
//! - `fincube secret` / `nullifier` / `commitment` — recompute field values.
//! - `fincube memo` — encode and size-check a settlement memo.
//! - `fincube prove` — run the proof pipeline on a prover-inputs file.
//! - `fincube transfer` — execute one transfer end to end.
//! - `fincube reconcile` — apply ledger updates left by partial transfers.
//! - `fincube replay-events` — deliver audit events that missed their sink.
//!
//! ```bash
//! fincube --config fincube.yaml transfer --fixture fixture.yaml \
//!     --sender-user-id 2001 --receiver-user-id 3001 --amount 100 \
//!     --mock-prover --mock-chain
//! ```

pub mod config;
pub mod derive;
pub mod events;
pub mod memo;
pub mod prove;
pub mod reconcile;
pub mod runtime;
pub mod transfer;

pub use config::{ConfigError, FincubeConfig};
