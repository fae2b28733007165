//! # Proving Toolchain Trait
//!
//! The boundary between the pipeline and whatever actually proves. One
//! method per stage; each reads and writes only inside the request's
//! [`ProofWorkspace`]. An in-process prover can replace the subprocess
//! backend without the pipeline or the orchestrator changing.
//!
//! Implementations must be deterministic: identical inputs produce
//! byte-identical artifacts.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::inputs::ProverInputs;
use crate::workspace::ProofWorkspace;

#[async_trait]
pub trait ProvingToolchain: Send + Sync {
    /// Stage the inputs. The default writes `Prover.toml`.
    async fn prepare_inputs(
        &self,
        workspace: &ProofWorkspace,
        inputs: &ProverInputs,
    ) -> Result<(), PipelineError> {
        workspace
            .write(&workspace.prover_toml(), inputs.to_prover_toml().as_bytes())
            .await
    }

    /// Compile the circuit to bytecode.
    async fn compile(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError>;

    /// Execute the circuit on the staged inputs, producing the witness.
    async fn generate_witness(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError>;

    /// Derive the verification key from the bytecode.
    async fn write_verification_key(&self, workspace: &ProofWorkspace)
        -> Result<(), PipelineError>;

    /// Produce the proof and public-input artifacts.
    async fn prove(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError>;
}
