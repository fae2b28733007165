//! # Prover Inputs
//!
//! The private and public values for one membership proof, and their
//! serialization into nargo's `Prover.toml`.
//!
//! Public inputs, in circuit order: `commitment_hash`, `verifier_key`,
//! `nullifier`, `is_verified_member`.

use std::fmt::Write as _;

use fincube_core::{FieldElement, BATCH_COEFFICIENTS};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Number of public inputs the membership circuit exposes.
pub const PUBLIC_INPUT_COUNT: usize = 4;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverInputs {
    /// Private: the member's root.
    pub secret: FieldElement,
    /// Private: the batch polynomial, lowest degree first.
    pub coefficients: Vec<FieldElement>,
    pub commitment_hash: FieldElement,
    pub verifier_key: FieldElement,
    pub nullifier: FieldElement,
    pub is_verified_member: bool,
}

impl ProverInputs {
    /// Reject inputs the circuit cannot even be fed.
    pub fn check_shape(&self) -> Result<(), PipelineError> {
        if self.coefficients.len() != BATCH_COEFFICIENTS {
            return Err(PipelineError::InputPreparation {
                reason: format!(
                    "expected {BATCH_COEFFICIENTS} coefficients, got {}",
                    self.coefficients.len()
                ),
            });
        }
        Ok(())
    }

    /// The public inputs the proof must carry, in circuit order.
    pub fn public_inputs(&self) -> [FieldElement; PUBLIC_INPUT_COUNT] {
        let flag = if self.is_verified_member {
            FieldElement::one()
        } else {
            FieldElement::zero()
        };
        [
            self.commitment_hash,
            self.verifier_key,
            self.nullifier,
            flag,
        ]
    }

    /// Render as `Prover.toml`. Field elements are 0x-prefixed hex strings.
    pub fn to_prover_toml(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "secret = \"{}\"", self.secret.to_hex());
        out.push_str("coefficients = [");
        for (i, c) in self.coefficients.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "\"{}\"", c.to_hex());
        }
        out.push_str("]\n");
        let _ = writeln!(out, "commitment_hash = \"{}\"", self.commitment_hash.to_hex());
        let _ = writeln!(out, "verifier_key = \"{}\"", self.verifier_key.to_hex());
        let _ = writeln!(out, "nullifier = \"{}\"", self.nullifier.to_hex());
        let _ = writeln!(out, "is_verified_member = {}", self.is_verified_member);
        out
    }
}

impl std::fmt::Debug for ProverInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProverInputs")
            .field("secret", &"<redacted>")
            .field("coefficients", &self.coefficients.len())
            .field("commitment_hash", &self.commitment_hash)
            .field("verifier_key", &self.verifier_key)
            .field("nullifier", &self.nullifier)
            .field("is_verified_member", &self.is_verified_member)
            .finish()
    }
}
