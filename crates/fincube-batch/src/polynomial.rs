//! # Root Polynomials
//!
//! Coefficients are stored lowest degree first: `c[i]` multiplies `x^i`.
//! Every vector produced here has exactly `BATCH_COEFFICIENTS` entries,
//! zero-padded above the actual degree, so the circuit always sees a fixed
//! shape regardless of how many members a batch holds.

use fincube_core::{FieldElement, BATCH_COEFFICIENTS, MAX_BATCH_MEMBERS};

use crate::error::BatchError;

/// Coefficients of `∏ (x - r)` over `roots`, padded to `BATCH_COEFFICIENTS`.
///
/// An empty root set yields the constant polynomial `1`.
pub fn build_polynomial(roots: &[FieldElement]) -> Result<Vec<FieldElement>, BatchError> {
    if roots.len() > MAX_BATCH_MEMBERS {
        return Err(BatchError::CapacityExceeded {
            requested: roots.len(),
            max: MAX_BATCH_MEMBERS,
        });
    }
    let mut coefficients = vec![FieldElement::one()];
    for root in roots {
        coefficients = multiply_by_linear(&coefficients, root);
    }
    coefficients.resize(BATCH_COEFFICIENTS, FieldElement::zero());
    Ok(coefficients)
}

/// Fold one more root into an existing padded coefficient vector.
///
/// Fails with `CapacityExceeded` when the polynomial already has full
/// degree, and with `MalformedBatch` when `coefficients` is not padded to
/// `BATCH_COEFFICIENTS`.
pub fn extend_polynomial(
    coefficients: &[FieldElement],
    root: &FieldElement,
) -> Result<Vec<FieldElement>, BatchError> {
    check_shape(coefficients)?;
    if !coefficients[MAX_BATCH_MEMBERS].is_zero() {
        return Err(BatchError::CapacityExceeded {
            requested: MAX_BATCH_MEMBERS + 1,
            max: MAX_BATCH_MEMBERS,
        });
    }
    let mut extended = multiply_by_linear(&coefficients[..MAX_BATCH_MEMBERS], root);
    extended.resize(BATCH_COEFFICIENTS, FieldElement::zero());
    Ok(extended)
}

/// Evaluate the polynomial at `x` (Horner's rule).
pub fn evaluate(coefficients: &[FieldElement], x: &FieldElement) -> FieldElement {
    coefficients
        .iter()
        .rev()
        .fold(FieldElement::zero(), |acc, c| acc * *x + *c)
}

/// Whether `x` is a root of the polynomial.
pub fn is_root(coefficients: &[FieldElement], x: &FieldElement) -> bool {
    evaluate(coefficients, x).is_zero()
}

pub(crate) fn check_shape(coefficients: &[FieldElement]) -> Result<(), BatchError> {
    if coefficients.len() != BATCH_COEFFICIENTS {
        return Err(BatchError::MalformedBatch {
            batch_id: String::from("<unsaved>"),
            reason: format!(
                "expected {BATCH_COEFFICIENTS} coefficients, got {}",
                coefficients.len()
            ),
        });
    }
    Ok(())
}

/// `p(x) * (x - root)`, one degree higher than `p`.
fn multiply_by_linear(p: &[FieldElement], root: &FieldElement) -> Vec<FieldElement> {
    let mut out = vec![FieldElement::zero(); p.len() + 1];
    for (i, c) in p.iter().enumerate() {
        out[i + 1] = out[i + 1] + *c;
        out[i] = out[i] - *c * *root;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fe(n: u64) -> FieldElement {
        FieldElement::from_u64(n)
    }

    #[test]
    fn two_roots_expand_correctly() {
        // (x - 2)(x - 3) = x^2 - 5x + 6
        let c = build_polynomial(&[fe(2), fe(3)]).unwrap();
        assert_eq!(c.len(), BATCH_COEFFICIENTS);
        assert_eq!(c[0], fe(6));
        assert_eq!(c[1], -fe(5));
        assert_eq!(c[2], fe(1));
        assert!(c[3..].iter().all(FieldElement::is_zero));
    }

    #[test]
    fn empty_roots_give_constant_one() {
        let c = build_polynomial(&[]).unwrap();
        assert_eq!(c[0], FieldElement::one());
        assert!(!is_root(&c, &fe(0)));
    }

    #[test]
    fn capacity_is_enforced() {
        let roots: Vec<_> = (1..=MAX_BATCH_MEMBERS as u64 + 1).map(fe).collect();
        assert!(matches!(
            build_polynomial(&roots),
            Err(BatchError::CapacityExceeded { requested: 129, max: 128 })
        ));
        let full = build_polynomial(&roots[..MAX_BATCH_MEMBERS]).unwrap();
        assert!(matches!(
            extend_polynomial(&full, &fe(999)),
            Err(BatchError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn extend_matches_build() {
        let built = build_polynomial(&[fe(7), fe(11), fe(13)]).unwrap();
        let mut grown = build_polynomial(&[]).unwrap();
        for r in [fe(7), fe(11), fe(13)] {
            grown = extend_polynomial(&grown, &r).unwrap();
        }
        assert_eq!(built, grown);
    }

    #[test]
    fn extend_rejects_unpadded_vectors() {
        assert!(matches!(
            extend_polynomial(&[FieldElement::one()], &fe(1)),
            Err(BatchError::MalformedBatch { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn every_root_evaluates_to_zero(seeds in proptest::collection::vec(any::<u64>(), 0..MAX_BATCH_MEMBERS)) {
            let roots: Vec<_> = seeds.iter().map(|s| fincube_crypto::digest_to_field(&s.to_be_bytes())).collect();
            let c = build_polynomial(&roots).unwrap();
            for r in &roots {
                prop_assert!(is_root(&c, r));
            }
        }

        #[test]
        fn non_members_are_not_roots(seeds in proptest::collection::vec(any::<u64>(), 1..32), probe in any::<u64>()) {
            prop_assume!(!seeds.contains(&probe));
            let roots: Vec<_> = seeds.iter().map(|s| fincube_crypto::digest_to_field(&s.to_be_bytes())).collect();
            let c = build_polynomial(&roots).unwrap();
            let outsider = fincube_crypto::digest_to_field(&probe.to_be_bytes());
            prop_assert!(!is_root(&c, &outsider));
        }
    }
}
