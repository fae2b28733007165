//! # Proof Pipeline
//!
//! Drives one [`ProvingToolchain`] through the stages of a proof request,
//! then validates and formats the result.
//!
//! ## Resource model
//!
//! Proving is process- and CPU-bound, so at most
//! `max_concurrent_proofs` requests run at once; the rest wait on a
//! semaphore. Each admitted request gets its own [`ProofWorkspace`],
//! removed when the request ends whatever the outcome.
//!
//! Every stage is bounded by `stage_timeout`, including in-process
//! backends. A timeout fails the request like any other stage failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::artifacts::validate_artifacts;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ProofStage, StageDiagnostics};
use crate::format::{check_public_inputs, format_proof, FormattedProof};
use crate::inputs::{ProverInputs, PUBLIC_INPUT_COUNT};
use crate::traits::ProvingToolchain;
use crate::workspace::ProofWorkspace;

pub struct ProofPipeline {
    toolchain: Arc<dyn ProvingToolchain>,
    config: PipelineConfig,
    permits: Arc<Semaphore>,
}

/// Tracks the in-flight gauge for the lifetime of one request.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::gauge!("fincube_proof_pipeline_in_flight").increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::gauge!("fincube_proof_pipeline_in_flight").decrement(1.0);
    }
}

impl ProofPipeline {
    pub fn new(toolchain: Arc<dyn ProvingToolchain>, config: PipelineConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_proofs.max(1)));
        Self {
            toolchain,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Proof slots not currently in use.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Generate and format a membership proof for `inputs`.
    pub async fn generate(&self, inputs: &ProverInputs) -> Result<FormattedProof, PipelineError> {
        inputs.check_shape()?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::Closed)?;
        let _in_flight = InFlight::enter();
        let started = Instant::now();

        let ws = ProofWorkspace::create(
            self.config.scratch_root.as_deref(),
            &self.config.circuit_name,
        )?;
        let tc = &self.toolchain;

        self.stage(ProofStage::PrepareInputs, tc.prepare_inputs(&ws, inputs))
            .await?;
        self.stage(ProofStage::Compile, tc.compile(&ws)).await?;
        if let Err(err) = self
            .stage(ProofStage::GenerateWitness, tc.generate_witness(&ws))
            .await
        {
            return Err(attach_inputs(err, &ws).await);
        }
        self.stage(
            ProofStage::WriteVerificationKey,
            tc.write_verification_key(&ws),
        )
        .await?;
        self.stage(ProofStage::Prove, tc.prove(&ws)).await?;

        let raw = validate_artifacts(&ws).await?;
        let formatted = format_proof(&raw.proof, &raw.public_inputs, PUBLIC_INPUT_COUNT)?;
        check_public_inputs(&formatted, &inputs.public_inputs())?;

        tracing::info!(
            proof_bytes = formatted.proof.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "membership proof generated"
        );
        Ok(formatted)
    }

    async fn stage<F>(&self, stage: ProofStage, fut: F) -> Result<(), PipelineError>
    where
        F: Future<Output = Result<(), PipelineError>>,
    {
        tracing::debug!(stage = stage.as_str(), "proof stage started");
        let started = Instant::now();

        let result = match tokio::time::timeout(self.config.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::StageFailed {
                stage,
                diagnostics: Box::new(StageDiagnostics {
                    timed_out: true,
                    ..StageDiagnostics::default()
                }),
            }),
        };

        metrics::histogram!("fincube_proof_stage_seconds", "stage" => stage.as_str())
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(()) => tracing::debug!(stage = stage.as_str(), "proof stage finished"),
            Err(e) => tracing::warn!(
                stage = stage.as_str(),
                kind = e.kind().as_str(),
                exit_code = ?e.diagnostics().and_then(|d| d.exit_code),
                "proof stage failed"
            ),
        }
        result
    }
}

/// Attach the staged `Prover.toml` to a witness failure's diagnostics.
async fn attach_inputs(err: PipelineError, ws: &ProofWorkspace) -> PipelineError {
    match err {
        PipelineError::StageFailed {
            stage,
            mut diagnostics,
        } => {
            if diagnostics.inputs.is_none() {
                diagnostics.inputs = tokio::fs::read_to_string(ws.prover_toml()).await.ok();
            }
            PipelineError::StageFailed { stage, diagnostics }
        }
        other => other,
    }
}
