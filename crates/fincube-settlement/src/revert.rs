//! # Revert Classification
//!
//! Maps a failed contract call onto [`SettlementError`]. The verifier
//! reverts with custom errors (`SumcheckFailed()`, `ShpleminiFailed()`,
//! `ProofLengthWrong()`, `PublicInputsLengthWrong()`); the FinCube contract
//! reverts with `Error(string)` messages. Nodes surface either as revert
//! data, as text in the error message, or both, so both are inspected.

use crate::abi::{decode_error_string, selector};
use crate::error::{SettlementError, VerificationFailure};

const VERIFIER_ERRORS: &[(&str, VerificationFailure)] = &[
    ("SumcheckFailed()", VerificationFailure::ConsistencyCheck),
    ("ShpleminiFailed()", VerificationFailure::ConsistencyCheck),
    ("ProofLengthWrong()", VerificationFailure::ProofLength),
    ("PublicInputsLengthWrong()", VerificationFailure::PublicInputsLength),
];

/// Classify a revert from its message and optional revert data.
pub fn classify_revert(message: &str, data: Option<&[u8]>, nullifier_hex: &str) -> SettlementError {
    if let Some(data) = data {
        if data.len() >= 4 {
            for (signature, failure) in VERIFIER_ERRORS {
                if data[..4] == selector(signature) {
                    return SettlementError::VerificationFailed {
                        reason: *failure,
                        detail: (*signature).to_string(),
                    };
                }
            }
        }
        if let Some(reason) = decode_error_string(data) {
            return classify_text(&reason, nullifier_hex);
        }
    }
    classify_text(message, nullifier_hex)
}

fn classify_text(text: &str, nullifier_hex: &str) -> SettlementError {
    for (signature, failure) in VERIFIER_ERRORS {
        let name = signature.trim_end_matches("()");
        if text.contains(name) {
            return SettlementError::VerificationFailed {
                reason: *failure,
                detail: text.to_string(),
            };
        }
    }
    let lower = text.to_ascii_lowercase();
    if lower.contains("nullifier") && (lower.contains("used") || lower.contains("spent")) {
        return SettlementError::NullifierAlreadyUsed {
            nullifier: nullifier_hex.to_string(),
        };
    }
    if lower.contains("invalid proof") || lower.contains("verification failed") {
        return SettlementError::VerificationFailed {
            reason: VerificationFailure::ProtocolInternal,
            detail: text.to_string(),
        };
    }
    SettlementError::Rejected(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{encode, Token, ERROR_STRING_SELECTOR};

    const N: &str = "0xabc";

    #[test]
    fn verifier_custom_errors_map_to_sub_reasons() {
        let cases = [
            ("SumcheckFailed()", VerificationFailure::ConsistencyCheck),
            ("ShpleminiFailed()", VerificationFailure::ConsistencyCheck),
            ("ProofLengthWrong()", VerificationFailure::ProofLength),
            ("PublicInputsLengthWrong()", VerificationFailure::PublicInputsLength),
        ];
        for (sig, expected) in cases {
            let data = selector(sig);
            match classify_revert("execution reverted", Some(&data), N) {
                SettlementError::VerificationFailed { reason, .. } => assert_eq!(reason, expected),
                other => panic!("{sig}: unexpected {other}"),
            }
        }
    }

    #[test]
    fn error_string_nullifier_reuse() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(encode(&[Token::String("Nullifier already used".into())]));
        assert_eq!(
            classify_revert("execution reverted", Some(&data), N),
            SettlementError::NullifierAlreadyUsed { nullifier: N.into() }
        );
    }

    #[test]
    fn message_text_is_used_without_data() {
        assert!(matches!(
            classify_revert("execution reverted: SumcheckFailed", None, N),
            SettlementError::VerificationFailed {
                reason: VerificationFailure::ConsistencyCheck,
                ..
            }
        ));
        assert!(matches!(
            classify_revert("execution reverted: Invalid proof", None, N),
            SettlementError::VerificationFailed {
                reason: VerificationFailure::ProtocolInternal,
                ..
            }
        ));
    }

    #[test]
    fn anything_else_is_a_rejection() {
        assert_eq!(
            classify_revert("execution reverted: Organization not approved", None, N),
            SettlementError::Rejected("execution reverted: Organization not approved".into())
        );
    }
}
