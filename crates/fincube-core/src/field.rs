//! # Field Elements — BN254 Scalar Field
//!
//! Defines [`FieldElement`], an integer in `[0, P)` where `P` is the BN254
//! scalar-field prime used by the membership circuit and the on-chain
//! verifier.
//!
//! ## Security Invariant
//!
//! Every `FieldElement` is canonical. Constructors that accept arbitrary
//! integers reduce modulo `P` (`reduce*`); constructors that accept an
//! already-encoded element (`from_canonical_bytes`, `from_hex`, serde)
//! reject values `>= P` instead of silently wrapping them, so a corrupted
//! stored coefficient or nullifier is detected rather than re-interpreted.
//!
//! ## Encoding
//!
//! The canonical external encoding is 32 bytes big-endian, rendered as
//! `0x` followed by 64 lowercase hex digits. This is the shape the settlement
//! contract expects for public inputs and `bytes32` arguments.

use std::ops::{Add, Mul, Neg, Sub};

use ark_bn254::Fr;
use ark_ff::{BigInteger, One, PrimeField, Zero};
use num_bigint::{BigInt, BigUint, Sign};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FieldError;

/// Byte length of an encoded field element.
pub const FIELD_BYTES: usize = 32;

/// Decimal rendering of the field modulus `P`.
pub const FIELD_MODULUS_DECIMAL: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

/// A canonical element of the BN254 scalar field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldElement(Fr);

impl FieldElement {
    /// The additive identity.
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(Fr::one())
    }

    /// Embed a `u64`. Always canonical since `u64::MAX < P`.
    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Embed a `u128`. Always canonical since `u128::MAX < P`.
    pub fn from_u128(value: u128) -> Self {
        Self(Fr::from(value))
    }

    /// Reduce an arbitrary-length big-endian byte string modulo `P`.
    pub fn reduce_be_bytes(bytes: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Reduce an arbitrary (possibly negative) integer modulo `P`.
    ///
    /// The result is the unique non-negative representative, so
    /// `reduce(-1) == P - 1`.
    pub fn reduce(value: &BigInt) -> Self {
        let modulus = BigInt::from_bytes_be(Sign::Plus, &Self::modulus_be_bytes());
        let reduced = ((value % &modulus) + &modulus) % &modulus;
        let (_, bytes) = reduced.to_bytes_be();
        Self::reduce_be_bytes(&bytes)
    }

    /// Parse a decimal integer (optionally negative) and reduce it modulo `P`.
    pub fn reduce_decimal(s: &str) -> Result<Self, FieldError> {
        let trimmed = s.trim();
        let value = BigInt::parse_bytes(trimmed.as_bytes(), 10)
            .ok_or_else(|| FieldError::InvalidDecimal(s.to_string()))?;
        Ok(Self::reduce(&value))
    }

    /// Decode a 32-byte big-endian encoding, rejecting values `>= P`.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, FieldError> {
        if bytes.len() != FIELD_BYTES {
            return Err(FieldError::WrongLength {
                expected: FIELD_BYTES,
                actual: bytes.len(),
            });
        }
        let candidate = Self::reduce_be_bytes(bytes);
        if candidate.to_be_bytes()[..] != bytes[..] {
            return Err(FieldError::NonCanonical(format!("0x{}", hex::encode(bytes))));
        }
        Ok(candidate)
    }

    /// Decode a hex string (with or without `0x`, at most 64 digits),
    /// rejecting values `>= P`.
    pub fn from_hex(s: &str) -> Result<Self, FieldError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > FIELD_BYTES * 2 {
            return Err(FieldError::InvalidHex {
                value: s.to_string(),
                reason: format!("expected 1 to {} hex digits", FIELD_BYTES * 2),
            });
        }
        let padded = format!("{digits:0>64}");
        let bytes = hex::decode(&padded).map_err(|e| FieldError::InvalidHex {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_canonical_bytes(&bytes)
    }

    /// Parse a decimal string, rejecting values `>= P` and negatives.
    pub fn from_decimal(s: &str) -> Result<Self, FieldError> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| FieldError::InvalidDecimal(s.to_string()))?;
        let modulus = BigUint::from_bytes_be(&Self::modulus_be_bytes());
        if value >= modulus {
            return Err(FieldError::NonCanonical(s.to_string()));
        }
        Ok(Self::reduce_be_bytes(&value.to_bytes_be()))
    }

    /// The 32-byte big-endian encoding.
    pub fn to_be_bytes(&self) -> [u8; FIELD_BYTES] {
        let raw = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; FIELD_BYTES];
        // Right-aligned; `to_bytes_be` yields 32 bytes for a 4-limb integer.
        let offset = FIELD_BYTES.saturating_sub(raw.len());
        out[offset..].copy_from_slice(&raw[raw.len().saturating_sub(FIELD_BYTES)..]);
        out
    }

    /// `0x` followed by 64 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    /// Decimal rendering of the canonical integer.
    pub fn to_decimal(&self) -> String {
        BigUint::from_bytes_be(&self.to_be_bytes()).to_string()
    }

    /// Whether this is the additive identity.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Raise to a small power by square-and-multiply.
    pub fn pow(&self, exp: u64) -> Self {
        let mut base = *self;
        let mut acc = Self::one();
        let mut e = exp;
        while e > 0 {
            if e & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            e >>= 1;
        }
        acc
    }

    /// Access the underlying arkworks scalar.
    pub fn into_inner(self) -> Fr {
        self.0
    }

    /// Big-endian bytes of the modulus `P`.
    pub fn modulus_be_bytes() -> Vec<u8> {
        Fr::MODULUS.to_bytes_be()
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Add for FieldElement {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for FieldElement {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for FieldElement {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl Neg for FieldElement {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl std::str::FromStr for FieldElement {
    type Err = FieldError;

    /// Accepts `0x`-prefixed hex or a plain decimal integer; both must be canonical.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") {
            Self::from_hex(s)
        } else {
            Self::from_decimal(s)
        }
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
