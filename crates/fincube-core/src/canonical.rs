//! # Canonical Serialization — JCS Byte Production
//!
//! `CanonicalBytes` is the only encoding used for payloads whose byte length
//! or digest must be reproducible: the settlement memo (size-limited, and
//! submitted on-chain) and audit events.
//!
//! ## Security Invariant
//!
//! The inner buffer is private. The only constructor applies float rejection
//! and then RFC 8785 (JSON Canonicalization Scheme) serialization: sorted
//! keys, compact separators, deterministic number rendering. Two processes
//! encoding the same logical memo therefore produce identical bytes, so a
//! size check performed here holds for what the contract receives.
//!
//! Floats are rejected outright. Token amounts travel as integers or decimal
//! strings; a float amount in a memo would have an encoding that depends on
//! the serializer's shortest-representation algorithm.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - The only constructors are [`CanonicalBytes::new()`] and
///   [`CanonicalBytes::from_value()`].
/// - Numbers are integers; floats are rejected.
/// - Object keys are sorted, separators are compact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integral number;
    /// `SerializationFailed` if serde cannot represent it as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Canonicalize an already-built JSON value.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// The canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The canonical bytes as UTF-8 text. JCS output is always valid UTF-8.
    pub fn as_str(&self) -> &str {
        // serde_jcs produces a `String`, so the buffer is valid UTF-8 by construction.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the encoding is empty (never true for a JSON document).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the owned buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(items) => items.iter().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted_and_compact() {
        let data = serde_json::json!({"sender_ref": "a", "amount": "100", "v": 1});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"{"amount":"100","sender_ref":"a","v":1}"#);
    }

    #[test]
    fn nested_objects_are_sorted() {
        let data = serde_json::json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1]});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn floats_are_rejected_even_when_nested() {
        let data = serde_json::json!({"memo": {"amount": 1.5}});
        match CanonicalBytes::new(&data).unwrap_err() {
            CanonicalizationError::FloatRejected(f) => assert_eq!(f, 1.5),
            other => panic!("expected FloatRejected, got {other}"),
        }
    }

    #[test]
    fn encoding_is_deterministic_across_insertion_order() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b = serde_json::json!({"y": 2, "x": 1});
        assert_eq!(
            CanonicalBytes::new(&a).unwrap(),
            CanonicalBytes::new(&b).unwrap()
        );
    }

    #[test]
    fn len_counts_utf8_bytes() {
        let data = serde_json::json!({"k": "é"});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.len(), cb.as_str().len());
        assert_eq!(cb.len(), r#"{"k":"é"}"#.len());
    }
}
