//! # Transfer Requests
//!
//! The caller-facing request and its validation. Validation is pure: a
//! rejected request has touched neither the ledger nor the chain.
//!
//! Amounts arrive as JSON numbers. They must be finite, positive and
//! integral, and no larger than the largest integer an `f64` represents
//! exactly, since the ledger settles whole token units.

use fincube_core::{ReferenceNumber, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest integer `f64` holds without rounding (2^53 - 1).
pub const MAX_EXACT_AMOUNT: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub receiver_reference_number: String,
    pub amount: f64,
    pub sender_user_id: i64,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub receiver_reference: ReferenceNumber,
    pub amount: u64,
    pub sender_user_id: UserId,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("receiver_reference_number must not be empty")]
    EmptyReference,

    #[error("receiver_reference_number is invalid: {0}")]
    InvalidReference(ValidationError),

    #[error("amount must be a finite number, got {0}")]
    NonFiniteAmount(f64),

    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(f64),

    #[error("amount must be a whole number of token units, got {0}")]
    FractionalAmount(f64),

    #[error("amount {0} exceeds the largest exactly representable amount")]
    AmountTooLarge(f64),

    #[error("sender_user_id must be a positive integer, got {0}")]
    InvalidSender(i64),
}

impl TransferRequest {
    pub fn new(receiver_reference_number: impl Into<String>, amount: f64, sender_user_id: i64) -> Self {
        Self {
            receiver_reference_number: receiver_reference_number.into(),
            amount,
            sender_user_id,
        }
    }

    /// Check every field. The first violation wins.
    pub fn validate(&self) -> Result<ValidatedTransfer, RequestError> {
        if self.receiver_reference_number.trim().is_empty() {
            return Err(RequestError::EmptyReference);
        }
        let receiver_reference = ReferenceNumber::new(self.receiver_reference_number.as_str())
            .map_err(RequestError::InvalidReference)?;

        let amount = validate_amount(self.amount)?;

        let sender_user_id = UserId::new(self.sender_user_id)
            .map_err(|_| RequestError::InvalidSender(self.sender_user_id))?;

        Ok(ValidatedTransfer {
            receiver_reference,
            amount,
            sender_user_id,
        })
    }
}

fn validate_amount(amount: f64) -> Result<u64, RequestError> {
    if !amount.is_finite() {
        return Err(RequestError::NonFiniteAmount(amount));
    }
    if amount <= 0.0 {
        return Err(RequestError::NonPositiveAmount(amount));
    }
    if amount.fract() != 0.0 {
        return Err(RequestError::FractionalAmount(amount));
    }
    if amount > MAX_EXACT_AMOUNT {
        return Err(RequestError::AmountTooLarge(amount));
    }
    // Integral and within 2^53, so the cast is exact.
    Ok(amount as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REF: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb_5d2c";

    #[test]
    fn valid_request() {
        let v = TransferRequest::new(REF, 100.0, 2001).validate().unwrap();
        assert_eq!(v.amount, 100);
        assert_eq!(v.sender_user_id.get(), 2001);
        assert_eq!(v.receiver_reference.as_str(), REF);
    }

    #[test]
    fn empty_reference_is_rejected() {
        assert_eq!(
            TransferRequest::new("   ", 1.0, 1).validate(),
            Err(RequestError::EmptyReference)
        );
    }

    #[test]
    fn malformed_reference_is_rejected() {
        assert!(matches!(
            TransferRequest::new("not-a-reference", 1.0, 1).validate(),
            Err(RequestError::InvalidReference(_))
        ));
    }

    #[test]
    fn amount_rules() {
        let check = |a: f64| TransferRequest::new(REF, a, 1).validate();
        assert!(matches!(check(f64::NAN), Err(RequestError::NonFiniteAmount(_))));
        assert!(matches!(check(f64::INFINITY), Err(RequestError::NonFiniteAmount(_))));
        assert!(matches!(check(0.0), Err(RequestError::NonPositiveAmount(_))));
        assert!(matches!(check(-5.0), Err(RequestError::NonPositiveAmount(_))));
        assert!(matches!(check(1.5), Err(RequestError::FractionalAmount(_))));
        assert!(matches!(check(1e20), Err(RequestError::AmountTooLarge(_))));
        assert_eq!(check(MAX_EXACT_AMOUNT).unwrap().amount, 9_007_199_254_740_991);
    }

    #[test]
    fn sender_must_be_positive() {
        assert_eq!(
            TransferRequest::new(REF, 1.0, 0).validate(),
            Err(RequestError::InvalidSender(0))
        );
        assert_eq!(
            TransferRequest::new(REF, 1.0, -7).validate(),
            Err(RequestError::InvalidSender(-7))
        );
    }

    #[test]
    fn deserializes_from_json() {
        let req: TransferRequest = serde_json::from_str(
            r#"{"receiver_reference_number":"0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb_5d2c","amount":100,"sender_user_id":2001}"#,
        )
        .unwrap();
        assert_eq!(req.amount, 100.0);
    }
}
