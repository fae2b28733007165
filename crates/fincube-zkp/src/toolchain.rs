//! # nargo / bb Subprocess Toolchain
//!
//! Runs the Noir compiler and the Barretenberg prover as child processes:
//!
//! | Stage | Invocation |
//! |---|---|
//! | compile | `nargo compile --program-dir <ws>` |
//! | generate witness | `nargo execute --program-dir <ws>` |
//! | verification key | `bb write_vk --scheme ultra_honk -b <bytecode> -o <ws>/vk` |
//! | prove | `bb prove --scheme ultra_honk -b <bytecode> -w <witness> -k <vk> -o <ws>/proof` |
//!
//! Every child is bounded by the configured stage timeout and killed when
//! it expires (`kill_on_drop`). A timeout is reported exactly like a
//! failed exit, with `timed_out` set.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, ProofStage, StageDiagnostics};
use crate::inputs::ProverInputs;
use crate::traits::ProvingToolchain;
use crate::workspace::ProofWorkspace;

/// Proving backend that shells out to `nargo` and `bb`.
#[derive(Debug, Clone)]
pub struct NargoToolchain {
    config: PipelineConfig,
}

impl NargoToolchain {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        stage: ProofStage,
        program: &Path,
        args: Vec<OsString>,
        cwd: &Path,
    ) -> Result<(), PipelineError> {
        let command: Vec<String> = std::iter::once(program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect();

        let child = Command::new(program)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                stage,
                program: program.display().to_string(),
                source,
            })?;

        match tokio::time::timeout(self.config.stage_timeout, child.wait_with_output()).await {
            Err(_elapsed) => {
                // The future owning the child was dropped, which kills it.
                tracing::warn!(
                    stage = stage.as_str(),
                    timeout_secs = self.config.stage_timeout.as_secs(),
                    "proof stage timed out"
                );
                Err(PipelineError::StageFailed {
                    stage,
                    diagnostics: Box::new(StageDiagnostics {
                        command,
                        exit_code: None,
                        timed_out: true,
                        ..StageDiagnostics::default()
                    }),
                })
            }
            Ok(Err(source)) => Err(PipelineError::Spawn {
                stage,
                program: program.display().to_string(),
                source,
            }),
            Ok(Ok(output)) => {
                tracing::debug!(
                    stage = stage.as_str(),
                    exit_code = ?output.status.code(),
                    "proof stage exited"
                );
                if output.status.success() {
                    return Ok(());
                }
                Err(PipelineError::StageFailed {
                    stage,
                    diagnostics: Box::new(StageDiagnostics {
                        command,
                        exit_code: output.status.code(),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        timed_out: false,
                        inputs: None,
                    }),
                })
            }
        }
    }
}

fn os(s: &str) -> OsString {
    OsString::from(s)
}

#[async_trait]
impl ProvingToolchain for NargoToolchain {
    async fn prepare_inputs(
        &self,
        workspace: &ProofWorkspace,
        inputs: &ProverInputs,
    ) -> Result<(), PipelineError> {
        workspace.stage_circuit(&self.config.circuit_dir).await?;
        workspace
            .write(&workspace.prover_toml(), inputs.to_prover_toml().as_bytes())
            .await
    }

    async fn compile(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        let args = vec![
            os("compile"),
            os("--program-dir"),
            workspace.root().into(),
        ];
        self.run(
            ProofStage::Compile,
            &self.config.nargo_binary,
            args,
            workspace.root(),
        )
        .await
    }

    async fn generate_witness(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        let args = vec![
            os("execute"),
            os("--program-dir"),
            workspace.root().into(),
        ];
        self.run(
            ProofStage::GenerateWitness,
            &self.config.nargo_binary,
            args,
            workspace.root(),
        )
        .await
    }

    async fn write_verification_key(
        &self,
        workspace: &ProofWorkspace,
    ) -> Result<(), PipelineError> {
        let args = vec![
            os("write_vk"),
            os("--scheme"),
            os("ultra_honk"),
            os("-b"),
            workspace.bytecode().into(),
            os("-o"),
            workspace.vk_dir().into(),
        ];
        self.run(
            ProofStage::WriteVerificationKey,
            &self.config.bb_binary,
            args,
            workspace.root(),
        )
        .await
    }

    async fn prove(&self, workspace: &ProofWorkspace) -> Result<(), PipelineError> {
        let args = vec![
            os("prove"),
            os("--scheme"),
            os("ultra_honk"),
            os("-b"),
            workspace.bytecode().into(),
            os("-w"),
            workspace.witness().into(),
            os("-k"),
            workspace.verification_key().into(),
            os("-o"),
            workspace.proof_dir().into(),
        ];
        self.run(
            ProofStage::Prove,
            &self.config.bb_binary,
            args,
            workspace.root(),
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn toolchain(timeout: Duration) -> NargoToolchain {
        NargoToolchain::new(PipelineConfig::default().with_stage_timeout(timeout))
    }

    #[tokio::test]
    async fn nonzero_exit_captures_output() {
        let ws = ProofWorkspace::create(None, "membership").unwrap();
        let err = toolchain(Duration::from_secs(10))
            .run(
                ProofStage::Compile,
                Path::new("sh"),
                vec![os("-c"), os("echo out; echo err >&2; exit 3")],
                ws.root(),
            )
            .await
            .unwrap_err();
        let diag = err.diagnostics().unwrap();
        assert_eq!(diag.exit_code, Some(3));
        assert_eq!(diag.stdout.trim(), "out");
        assert_eq!(diag.stderr.trim(), "err");
        assert!(!diag.timed_out);
        assert_eq!(err.kind(), fincube_core::ErrorKind::CompilationFailed);
    }

    #[tokio::test]
    async fn timeout_is_a_stage_failure() {
        let ws = ProofWorkspace::create(None, "membership").unwrap();
        let err = toolchain(Duration::from_millis(100))
            .run(
                ProofStage::Prove,
                Path::new("sh"),
                vec![os("-c"), os("sleep 5")],
                ws.root(),
            )
            .await
            .unwrap_err();
        assert!(err.diagnostics().unwrap().timed_out);
        assert_eq!(err.kind(), fincube_core::ErrorKind::ProofGenerationFailed);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let ws = ProofWorkspace::create(None, "membership").unwrap();
        let err = toolchain(Duration::from_secs(1))
            .run(
                ProofStage::Compile,
                Path::new("/nonexistent/nargo"),
                vec![],
                ws.root(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
