//! Errors raised by the hash primitives.

use fincube_core::ErrorKind;
use thiserror::Error;

/// Failure inside a hash primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// `algebraic_hash` was called with no elements.
    #[error("algebraic hash requires at least one input element")]
    EmptyInput,

    /// The Poseidon backend rejected its parameters or inputs.
    #[error("poseidon hash failed: {0}")]
    Poseidon(String),
}

impl CryptoError {
    /// Stable type tag. Both variants indicate a caller bug, not bad data.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InternalError
    }
}
