//! # Mock Proving Toolchain
//!
//! A deterministic, transparent stand-in for `nargo` + `bb`. Artifacts are
//! SHA-256 chains over the staged inputs, so identical inputs give
//! byte-identical artifacts. It provides NO zero-knowledge and NO
//! soundness; it exists so the pipeline and orchestrator can be exercised
//! without the external toolchain.
//!
//! Witness generation still enforces the circuit's constraints (secret is
//! a root, commitment and nullifier recompute, membership flag set) and
//! fails the way `nargo execute` does when they are violated.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use fincube_core::FieldElement;
use fincube_crypto::{algebraic_hash, nullifier};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, ProofStage, StageDiagnostics};
use crate::inputs::ProverInputs;
use crate::traits::ProvingToolchain;
use crate::workspace::ProofWorkspace;

/// Field elements in a mock proof.
const MOCK_PROOF_WORDS: usize = 16;

const INPUTS_SIDECAR: &str = "mock_inputs.json";

#[derive(Debug, Default)]
pub struct MockToolchain {
    fail_at: HashSet<ProofStage>,
    invocations: AtomicUsize,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` fail unconditionally with a non-zero exit.
    pub fn failing_at(mut self, stage: ProofStage) -> Self {
        self.fail_at.insert(stage);
        self
    }

    /// Total stage invocations across all requests.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn enter(&self, stage: ProofStage) -> Result<(), PipelineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.fail_at.contains(&stage) {
            return Err(failure(stage, "injected failure"));
        }
        Ok(())
    }
}

fn failure(stage: ProofStage, stderr: &str) -> PipelineError {
    PipelineError::StageFailed {
        stage,
        diagnostics: Box::new(StageDiagnostics {
            command: vec!["mock".to_string(), stage.as_str().to_string()],
            exit_code: Some(1),
            stderr: stderr.to_string(),
            ..StageDiagnostics::default()
        }),
    }
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

/// Why the inputs do not satisfy the membership circuit, if they don't.
fn constraint_violation(inputs: &ProverInputs) -> Option<&'static str> {
    let eval = inputs
        .coefficients
        .iter()
        .rev()
        .fold(FieldElement::zero(), |acc, c| acc * inputs.secret + *c);
    if !eval.is_zero() {
        return Some("Failed constraint: secret is not a root of the batch polynomial");
    }
    if algebraic_hash(&inputs.coefficients).ok() != Some(inputs.commitment_hash) {
        return Some("Failed constraint: commitment_hash mismatch");
    }
    if nullifier(&inputs.secret, &inputs.verifier_key).ok() != Some(inputs.nullifier) {
        return Some("Failed constraint: nullifier mismatch");
    }
    if !inputs.is_verified_member {
        return Some("Failed constraint: is_verified_member must be true");
    }
    None
}

#[async_trait]
impl ProvingToolchain for MockToolchain {
    async fn prepare_inputs(
        &self,
        workspace: &ProofWorkspace,
        inputs: &ProverInputs,
    ) -> Result<(), PipelineError> {
        self.enter(ProofStage::PrepareInputs)?;
        workspace
            .write(&workspace.prover_toml(), inputs.to_prover_toml().as_bytes())
            .await?;
        let json = serde_json::to_vec(inputs).map_err(|e| PipelineError::InputPreparation {
            reason: e.to_string(),
        })?;
        workspace
            .write(&workspace.root().join(INPUTS_SIDECAR), &json)
            .await
    }

    async fn compile(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        self.enter(ProofStage::Compile)?;
        let bytecode = digest(&[b"fincube-mock-circuit", workspace.circuit_name().as_bytes()]);
        workspace
            .write(&workspace.bytecode(), hex::encode(bytecode).as_bytes())
            .await
    }

    async fn generate_witness(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        self.enter(ProofStage::GenerateWitness)?;
        let bytecode = workspace.read(&workspace.bytecode()).await?;
        let raw = workspace.read(&workspace.root().join(INPUTS_SIDECAR)).await?;
        let inputs: ProverInputs =
            serde_json::from_slice(&raw).map_err(|e| PipelineError::InputPreparation {
                reason: e.to_string(),
            })?;
        if let Some(reason) = constraint_violation(&inputs) {
            return Err(failure(ProofStage::GenerateWitness, reason));
        }
        let witness = digest(&[&bytecode, &raw]);
        workspace.write(&workspace.witness(), &witness).await
    }

    async fn write_verification_key(
        &self,
        workspace: &ProofWorkspace,
    ) -> Result<(), PipelineError> {
        self.enter(ProofStage::WriteVerificationKey)?;
        let bytecode = workspace.read(&workspace.bytecode()).await?;
        let vk = digest(&[b"vk", &bytecode]);
        workspace.write(&workspace.verification_key(), &vk).await
    }

    async fn prove(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        self.enter(ProofStage::Prove)?;
        let witness = workspace.read(&workspace.witness()).await?;
        let vk = workspace.read(&workspace.verification_key()).await?;
        let raw = workspace.read(&workspace.root().join(INPUTS_SIDECAR)).await?;
        let inputs: ProverInputs =
            serde_json::from_slice(&raw).map_err(|e| PipelineError::InputPreparation {
                reason: e.to_string(),
            })?;

        let mut proof = Vec::with_capacity(MOCK_PROOF_WORDS * 32);
        let mut word = digest(&[&witness, &vk]);
        for _ in 0..MOCK_PROOF_WORDS {
            // Keep every word below the modulus like a real proof's field elements.
            word[0] &= 0x0f;
            proof.extend_from_slice(&word);
            word = digest(&[&word]);
        }
        let public_inputs: Vec<u8> = inputs
            .public_inputs()
            .iter()
            .flat_map(FieldElement::to_be_bytes)
            .collect();

        workspace.write(&workspace.proof(), &proof).await?;
        workspace
            .write(&workspace.public_inputs(), &public_inputs)
            .await
    }
}
