//! Proof pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the proof pipeline and its nargo/bb backend.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// `nargo` executable (compile and execute).
    pub nargo_binary: PathBuf,
    /// `bb` executable (verification key and proof).
    pub bb_binary: PathBuf,
    /// Directory holding the circuit's `Nargo.toml` and `src/`.
    pub circuit_dir: PathBuf,
    /// Package name from `Nargo.toml`; names the compiled artifacts.
    pub circuit_name: String,
    /// Upper bound on each external invocation.
    pub stage_timeout: Duration,
    /// Proof requests allowed to run at once.
    pub max_concurrent_proofs: usize,
    /// Parent directory for per-request workspaces. System temp dir if `None`.
    pub scratch_root: Option<PathBuf>,
}

impl PipelineConfig {
    /// Create a configuration for the circuit in `circuit_dir`.
    ///
    /// Defaults: `nargo` and `bb` from `PATH`, package name `membership`,
    /// 120 s per stage, 4 concurrent proofs.
    pub fn new(circuit_dir: impl Into<PathBuf>) -> Self {
        Self {
            nargo_binary: PathBuf::from("nargo"),
            bb_binary: PathBuf::from("bb"),
            circuit_dir: circuit_dir.into(),
            circuit_name: "membership".to_string(),
            stage_timeout: Duration::from_secs(120),
            max_concurrent_proofs: 4,
            scratch_root: None,
        }
    }

    pub fn with_nargo_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.nargo_binary = path.into();
        self
    }

    pub fn with_bb_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.bb_binary = path.into();
        self
    }

    pub fn with_circuit_name(mut self, name: impl Into<String>) -> Self {
        self.circuit_name = name.into();
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Set the worker bound. Clamped to at least one.
    pub fn with_max_concurrent_proofs(mut self, n: usize) -> Self {
        self.max_concurrent_proofs = n.max(1);
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new("circuits/membership")
    }
}
