//! # Algebraic Hash — Poseidon over BN254
//!
//! `algebraic_hash` is the hash recomputed inside the membership circuit
//! and checked by the on-chain verifier, so it must agree with them exactly.
//! It uses the circom parameter set (x^5 S-box, 8 full rounds, width-specific
//! partial rounds and constants), which is also what Noir's
//! `std::hash::poseidon::bn254::hash_N` implements.
//!
//! ## Variable-length inputs
//!
//! The circom parameters stop at 12 inputs (state width 13). Longer inputs,
//! such as the 129 batch coefficients, are absorbed in chunks:
//!
//! ```text
//! acc = Poseidon_12(xs[0..12])
//! acc = Poseidon_{1+k}(acc, xs[i..i+k])    k <= 11, until exhausted
//! ```
//!
//! For `len <= 12` the result is plain `Poseidon_len(xs)`. The circuit uses
//! the same chaining, so both sides agree for every length.

use ark_bn254::Fr;
use fincube_core::FieldElement;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::CryptoError;

/// Largest input count a single circom Poseidon permutation accepts.
pub const POSEIDON_MAX_WIDTH: usize = 12;

/// Hash a non-empty sequence of field elements.
///
/// # Errors
///
/// `EmptyInput` for an empty slice.
pub fn algebraic_hash(elements: &[FieldElement]) -> Result<FieldElement, CryptoError> {
    if elements.is_empty() {
        return Err(CryptoError::EmptyInput);
    }
    let inputs: Vec<Fr> = elements.iter().map(|e| e.into_inner()).collect();

    let first_len = inputs.len().min(POSEIDON_MAX_WIDTH);
    let mut acc = poseidon(&inputs[..first_len])?;

    for chunk in inputs[first_len..].chunks(POSEIDON_MAX_WIDTH - 1) {
        let mut round = Vec::with_capacity(chunk.len() + 1);
        round.push(acc);
        round.extend_from_slice(chunk);
        acc = poseidon(&round)?;
    }

    Ok(FieldElement::from(acc))
}

fn poseidon(inputs: &[Fr]) -> Result<Fr, CryptoError> {
    let mut hasher =
        Poseidon::<Fr>::new_circom(inputs.len()).map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    hasher
        .hash(inputs)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))
}
