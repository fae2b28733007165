//! Post-proof artifact validation.

use std::path::Path;

use crate::error::PipelineError;
use crate::workspace::ProofWorkspace;

/// Proof and public-input blobs as the prover wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProof {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

/// Confirm every expected artifact exists and is non-empty, then load the
/// proof and public inputs. A missing artifact is an error, never skipped.
pub async fn validate_artifacts(workspace: &ProofWorkspace) -> Result<RawProof, PipelineError> {
    require("bytecode", &workspace.bytecode()).await?;
    require("witness", &workspace.witness()).await?;
    require("verification_key", &workspace.verification_key()).await?;
    require("proof", &workspace.proof()).await?;
    require("public_inputs", &workspace.public_inputs()).await?;

    Ok(RawProof {
        proof: workspace.read(&workspace.proof()).await?,
        public_inputs: workspace.read(&workspace.public_inputs()).await?,
    })
}

async fn require(artifact: &'static str, path: &Path) -> Result<(), PipelineError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(PipelineError::ArtifactMissing {
            artifact,
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn populated() -> ProofWorkspace {
        let ws = ProofWorkspace::create(None, "membership").unwrap();
        for p in [
            ws.bytecode(),
            ws.witness(),
            ws.verification_key(),
            ws.proof(),
            ws.public_inputs(),
        ] {
            ws.write(&p, b"x").await.unwrap();
        }
        ws
    }

    #[tokio::test]
    async fn all_present_loads_proof() {
        let ws = populated().await;
        let raw = validate_artifacts(&ws).await.unwrap();
        assert_eq!(raw.proof, b"x");
    }

    #[tokio::test]
    async fn missing_witness_is_reported_by_name() {
        let ws = populated().await;
        std::fs::remove_file(ws.witness()).unwrap();
        match validate_artifacts(&ws).await.unwrap_err() {
            PipelineError::ArtifactMissing { artifact, .. } => assert_eq!(artifact, "witness"),
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn empty_vk_counts_as_missing() {
        let ws = populated().await;
        ws.write(&ws.verification_key(), b"").await.unwrap();
        assert!(matches!(
            validate_artifacts(&ws).await,
            Err(PipelineError::ArtifactMissing { artifact: "verification_key", .. })
        ));
    }
}
