//! # Nullifier
//!
//! `nullifier(secret, verifier_key) = algebraic_hash([secret, verifier_key])`.
//!
//! The verifier key is the paying organization's settlement address, so one
//! member yields a distinct nullifier towards each counterparty, and the
//! same nullifier every time towards the same one. The settlement contract
//! records it on first use; a second submission is rejected there.

use fincube_core::FieldElement;

use crate::error::CryptoError;
use crate::poseidon::algebraic_hash;

/// Compute the anti-replay token for `secret` proving to `verifier_key`.
pub fn nullifier(
    secret: &FieldElement,
    verifier_key: &FieldElement,
) -> Result<FieldElement, CryptoError> {
    algebraic_hash(&[*secret, *verifier_key])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256::digest_to_field;
    use std::collections::HashSet;

    #[test]
    fn reproducible_for_same_pair() {
        let s = digest_to_field(b"member");
        let v = FieldElement::from_u64(0xb0b);
        assert_eq!(nullifier(&s, &v).unwrap(), nullifier(&s, &v).unwrap());
    }

    #[test]
    fn distinct_per_verifier() {
        let s = digest_to_field(b"member");
        let a = nullifier(&s, &FieldElement::from_u64(1)).unwrap();
        let b = nullifier(&s, &FieldElement::from_u64(2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn no_collisions_across_a_large_sample_of_secrets() {
        let v = FieldElement::from_u64(0xa11ce);
        let mut seen = HashSet::new();
        for i in 0u32..2000 {
            let s = digest_to_field(&i.to_be_bytes());
            assert!(seen.insert(nullifier(&s, &v).unwrap()));
        }
    }

    #[test]
    fn encodes_to_32_bytes() {
        let n = nullifier(&FieldElement::one(), &FieldElement::one()).unwrap();
        assert_eq!(n.to_be_bytes().len(), 32);
        assert_eq!(n.to_hex().len(), 66);
    }
}
