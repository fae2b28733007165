//! # Proof Workspace
//!
//! One scratch directory per proof request. Every stage of the request
//! reads and writes inside it; no two requests ever share one. The
//! directory is removed when the workspace is dropped.
//!
//! Layout:
//!
//! ```text
//! <root>/Nargo.toml, src/        circuit sources (nargo backend only)
//! <root>/Prover.toml             staged inputs
//! <root>/target/<name>.json      bytecode
//! <root>/target/<name>.gz        witness
//! <root>/vk/vk                   verification key
//! <root>/proof/proof             proof
//! <root>/proof/public_inputs     public inputs
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PipelineError;

pub struct ProofWorkspace {
    dir: TempDir,
    circuit_name: String,
}

impl ProofWorkspace {
    /// Create an empty workspace under `scratch_root`, or the system temp
    /// dir when `None`.
    pub fn create(
        scratch_root: Option<&Path>,
        circuit_name: &str,
    ) -> Result<Self, PipelineError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("fincube-proof-");
            b
        };
        let dir = match scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .map_err(|e| PipelineError::workspace(root, e))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::workspace(scratch_root.unwrap_or(Path::new(".")), e))?;

        let ws = Self {
            dir,
            circuit_name: circuit_name.to_string(),
        };
        for sub in [ws.target_dir(), ws.vk_dir(), ws.proof_dir()] {
            std::fs::create_dir_all(&sub).map_err(|e| PipelineError::workspace(&sub, e))?;
        }
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn circuit_name(&self) -> &str {
        &self.circuit_name
    }

    pub fn prover_toml(&self) -> PathBuf {
        self.root().join("Prover.toml")
    }

    pub fn target_dir(&self) -> PathBuf {
        self.root().join("target")
    }

    pub fn bytecode(&self) -> PathBuf {
        self.target_dir().join(format!("{}.json", self.circuit_name))
    }

    pub fn witness(&self) -> PathBuf {
        self.target_dir().join(format!("{}.gz", self.circuit_name))
    }

    pub fn vk_dir(&self) -> PathBuf {
        self.root().join("vk")
    }

    pub fn verification_key(&self) -> PathBuf {
        self.vk_dir().join("vk")
    }

    pub fn proof_dir(&self) -> PathBuf {
        self.root().join("proof")
    }

    pub fn proof(&self) -> PathBuf {
        self.proof_dir().join("proof")
    }

    pub fn public_inputs(&self) -> PathBuf {
        self.proof_dir().join("public_inputs")
    }

    /// Write a file inside the workspace.
    pub async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| PipelineError::workspace(path, e))
    }

    /// Read a file inside the workspace.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::workspace(path, e))
    }

    /// Copy the circuit project (`Nargo.toml` and `src/`) into the workspace
    /// so `nargo` writes its `target/` here rather than in the shared tree.
    pub async fn stage_circuit(&self, circuit_dir: &Path) -> Result<(), PipelineError> {
        let manifest = circuit_dir.join("Nargo.toml");
        tokio::fs::copy(&manifest, self.root().join("Nargo.toml"))
            .await
            .map_err(|e| PipelineError::workspace(&manifest, e))?;
        copy_dir(&circuit_dir.join("src"), &self.root().join("src")).await
    }
}

async fn copy_dir(from: &Path, to: &Path) -> Result<(), PipelineError> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst)
            .await
            .map_err(|e| PipelineError::workspace(&dst, e))?;
        let mut entries = tokio::fs::read_dir(&src)
            .await
            .map_err(|e| PipelineError::workspace(&src, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::workspace(&src, e))?
        {
            let path = entry.path();
            let target = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| PipelineError::workspace(&path, e))?;
            if file_type.is_dir() {
                pending.push((path, target));
            } else {
                tokio::fs::copy(&path, &target)
                    .await
                    .map_err(|e| PipelineError::workspace(&path, e))?;
            }
        }
    }
    Ok(())
}
