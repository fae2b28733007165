//! # Pipeline Errors
//!
//! Every failure names the stage it happened in. Subprocess failures keep
//! the full exit status and captured output in [`StageDiagnostics`] so the
//! orchestrator can forward them to the operator unchanged.

use std::path::PathBuf;

use fincube_core::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The ordered stages of one proof request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStage {
    PrepareInputs,
    Compile,
    GenerateWitness,
    WriteVerificationKey,
    Prove,
}

impl ProofStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrepareInputs => "prepare_inputs",
            Self::Compile => "compile",
            Self::GenerateWitness => "generate_witness",
            Self::WriteVerificationKey => "write_verification_key",
            Self::Prove => "prove",
        }
    }

    /// Error tag reported when this stage fails.
    pub fn failure_kind(&self) -> ErrorKind {
        match self {
            Self::PrepareInputs => ErrorKind::InputPreparationFailed,
            Self::Compile => ErrorKind::CompilationFailed,
            Self::GenerateWitness => ErrorKind::WitnessGenerationFailed,
            Self::WriteVerificationKey | Self::Prove => ErrorKind::ProofGenerationFailed,
        }
    }
}

impl std::fmt::Display for ProofStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an external invocation left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Program and arguments as invoked.
    pub command: Vec<String>,
    /// Exit code, `None` if killed or never exited.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The stage was killed after exceeding its timeout.
    pub timed_out: bool,
    /// Contents of the staged input file. Attached on witness failures,
    /// which are almost always constraint violations in the inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<String>,
}

/// The raw proof or public inputs cannot be shaped for the contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("proof is empty")]
    EmptyProof,

    #[error("{what} length {len} is not a multiple of 32 bytes")]
    Misaligned { what: &'static str, len: usize },

    #[error("expected {expected} public inputs, got {actual}")]
    PublicInputCount { expected: usize, actual: usize },

    #[error("public input {index} is not a canonical field element")]
    NonCanonicalPublicInput { index: usize },

    #[error("public input {index} is {actual}, expected {expected}")]
    PublicInputMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("{what} is neither raw bytes nor hex: {reason}")]
    InvalidHex { what: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Inputs are inconsistent or could not be staged.
    #[error("input preparation failed: {reason}")]
    InputPreparation { reason: String },

    /// The scratch workspace could not be created or written.
    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external program could not be started.
    #[error("{stage}: failed to start {program}: {source}")]
    Spawn {
        stage: ProofStage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program ran and failed, or timed out.
    #[error("{stage} failed (exit code {:?}, timed out: {})", .diagnostics.exit_code, .diagnostics.timed_out)]
    StageFailed {
        stage: ProofStage,
        diagnostics: Box<StageDiagnostics>,
    },

    /// An expected artifact is absent or empty after proving.
    #[error("artifact {artifact} missing or empty at {path}")]
    ArtifactMissing {
        artifact: &'static str,
        path: PathBuf,
    },

    #[error("proof formatting failed: {0}")]
    Format(#[from] FormatError),

    /// The pipeline has been shut down.
    #[error("proof pipeline is closed")]
    Closed,
}

impl PipelineError {
    /// Stable type tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputPreparation { .. } | Self::Workspace { .. } => {
                ErrorKind::InputPreparationFailed
            }
            Self::Spawn { stage, .. } | Self::StageFailed { stage, .. } => stage.failure_kind(),
            Self::ArtifactMissing { .. } => ErrorKind::ArtifactValidationFailed,
            Self::Format(_) => ErrorKind::ProofFormatFailed,
            Self::Closed => ErrorKind::InternalError,
        }
    }

    /// The stage the failure belongs to, when it maps to one.
    pub fn stage(&self) -> Option<ProofStage> {
        match self {
            Self::InputPreparation { .. } | Self::Workspace { .. } => {
                Some(ProofStage::PrepareInputs)
            }
            Self::Spawn { stage, .. } | Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Subprocess diagnostics, when the failure came from one.
    pub fn diagnostics(&self) -> Option<&StageDiagnostics> {
        match self {
            Self::StageFailed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}
