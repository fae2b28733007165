//! # fincube-zkp — Membership Proof Pipeline
//!
//! Turns a member's secret and its batch into a proof that the secret is a
//! root of the batch polynomial, plus the public inputs the settlement
//! contract verifies against.
//!
//! ## Stages
//!
//! Each request runs strictly in order, in its own scratch workspace:
//!
//! 1. **prepare inputs**: write `Prover.toml`
//! 2. **compile**: circuit to ACIR bytecode
//! 3. **generate witness**: execute the circuit on the staged inputs
//! 4. **prove**: write the verification key, then the proof and public inputs
//!
//! followed by artifact validation and formatting into contract shapes.
//! A failed or timed-out stage ends the request with a typed error carrying
//! the subprocess diagnostics. Nothing is retried here.
//!
//! ## Backends
//!
//! [`ProvingToolchain`] is the seam. [`NargoToolchain`] shells out to
//! `nargo` and `bb`; [`MockToolchain`] is a deterministic, transparent
//! stand-in that still enforces the membership constraints, for tests.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod format;
pub mod inputs;
pub mod mock;
pub mod pipeline;
pub mod toolchain;
pub mod traits;
pub mod workspace;

pub use artifacts::{validate_artifacts, RawProof};
pub use config::PipelineConfig;
pub use error::{FormatError, PipelineError, ProofStage, StageDiagnostics};
pub use format::{format_proof, FormattedProof};
pub use inputs::{ProverInputs, PUBLIC_INPUT_COUNT};
pub use mock::MockToolchain;
pub use pipeline::ProofPipeline;
pub use toolchain::NargoToolchain;
pub use traits::ProvingToolchain;
pub use workspace::ProofWorkspace;
