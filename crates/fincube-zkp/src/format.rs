//! # Proof Formatting
//!
//! Shapes prover output for the settlement contract: the proof as one byte
//! string, each public input as a 32-byte big-endian field element. The
//! prover may emit either raw bytes or hex text; both are accepted.
//! Anything off-shape fails closed with [`FormatError`] rather than being
//! sent on-chain.

use fincube_core::{FieldElement, FIELD_BYTES};
use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// A proof ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedProof {
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    pub public_inputs: Vec<FieldElement>,
}

impl FormattedProof {
    /// `0x`-prefixed hex of the proof bytes.
    pub fn proof_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.proof))
    }

    /// Public inputs as `bytes32` values.
    pub fn public_inputs_bytes32(&self) -> Vec<[u8; FIELD_BYTES]> {
        self.public_inputs.iter().map(FieldElement::to_be_bytes).collect()
    }
}

/// Convert raw artifacts into contract shapes, checking the public-input
/// count.
pub fn format_proof(
    raw_proof: &[u8],
    raw_public_inputs: &[u8],
    expected_public_inputs: usize,
) -> Result<FormattedProof, FormatError> {
    let proof = decode_blob("proof", raw_proof)?;
    if proof.is_empty() {
        return Err(FormatError::EmptyProof);
    }
    if proof.len() % FIELD_BYTES != 0 {
        return Err(FormatError::Misaligned {
            what: "proof",
            len: proof.len(),
        });
    }

    let inputs = decode_blob("public_inputs", raw_public_inputs)?;
    if inputs.len() % FIELD_BYTES != 0 {
        return Err(FormatError::Misaligned {
            what: "public_inputs",
            len: inputs.len(),
        });
    }
    let count = inputs.len() / FIELD_BYTES;
    if count != expected_public_inputs {
        return Err(FormatError::PublicInputCount {
            expected: expected_public_inputs,
            actual: count,
        });
    }
    let public_inputs = inputs
        .chunks_exact(FIELD_BYTES)
        .enumerate()
        .map(|(index, chunk)| {
            FieldElement::from_canonical_bytes(chunk)
                .map_err(|_| FormatError::NonCanonicalPublicInput { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FormattedProof {
        proof,
        public_inputs,
    })
}

/// Check that the proof's public inputs are exactly `expected`.
pub fn check_public_inputs(
    formatted: &FormattedProof,
    expected: &[FieldElement],
) -> Result<(), FormatError> {
    if formatted.public_inputs.len() != expected.len() {
        return Err(FormatError::PublicInputCount {
            expected: expected.len(),
            actual: formatted.public_inputs.len(),
        });
    }
    for (index, (actual, want)) in formatted.public_inputs.iter().zip(expected).enumerate() {
        if actual != want {
            return Err(FormatError::PublicInputMismatch {
                index,
                expected: want.to_hex(),
                actual: actual.to_hex(),
            });
        }
    }
    Ok(())
}

/// Hex text (optionally `0x`-prefixed, surrounding whitespace ignored) is
/// decoded; anything else is taken as raw bytes.
fn decode_blob(what: &'static str, blob: &[u8]) -> Result<Vec<u8>, FormatError> {
    let text = match std::str::from_utf8(blob) {
        Ok(t) => t.trim(),
        Err(_) => return Ok(blob.to_vec()),
    };
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let looks_hex = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit());
    if !looks_hex {
        return Ok(blob.to_vec());
    }
    if digits.len() % 2 != 0 {
        return Err(FormatError::InvalidHex {
            what,
            reason: "odd number of hex digits".to_string(),
        });
    }
    hex::decode(digits).map_err(|e| FormatError::InvalidHex {
        what,
        reason: e.to_string(),
    })
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
