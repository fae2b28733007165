//! Public commitment to a batch: `algebraic_hash(coefficients)`.

use fincube_core::FieldElement;
use fincube_crypto::algebraic_hash;

use crate::error::BatchError;
use crate::polynomial::check_shape;

/// Hash a padded coefficient vector into the commitment the proof attests
/// against.
pub fn commitment_hash(coefficients: &[FieldElement]) -> Result<FieldElement, BatchError> {
    check_shape(coefficients)?;
    Ok(algebraic_hash(coefficients)?)
}
