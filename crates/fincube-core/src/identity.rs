//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the engine. Each
//! identifier is a distinct type: you cannot pass a [`BatchId`] where an
//! [`OrgId`] is expected, or a raw string where a [`ReferenceNumber`] is.
//!
//! ## Validation
//!
//! String-based identifiers ([`SettlementAddress`], [`ReferenceNumber`],
//! [`OrgSalt`]) validate format at construction time and at
//! deserialization time. UUID-based identifiers are valid by construction.
//!
//! ## Privacy
//!
//! [`IdentityKey`] and [`OrgSalt`] feed secret derivation. Their `Debug`
//! output is redacted so they cannot leak through `tracing` fields or error
//! messages.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::field::FieldElement;

/// Route string newtypes' `Deserialize` through their validating `new()`.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Numeric / UUID identifiers
// ---------------------------------------------------------------------------

/// Ledger identifier of a user. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Validate and wrap a user id.
    pub fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    /// The raw integer.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a member organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(Uuid);

impl OrgId {
    /// Create a new random organization identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a membership batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Create a new random batch identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Settlement addresses and reference numbers
// ---------------------------------------------------------------------------

/// An organization's on-chain settlement address: `0x` + 40 hex digits,
/// normalised to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SettlementAddress(String);

impl SettlementAddress {
    /// Validate and normalise an address.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let lower = raw.trim().to_ascii_lowercase();
        let valid = lower.len() == 42
            && lower.starts_with("0x")
            && lower[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ValidationError::InvalidAddress(raw));
        }
        Ok(Self(lower))
    }

    /// The normalised `0x…` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 raw address bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Validated in `new`: exactly 40 hex digits follow the prefix.
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }

    /// The address interpreted as a big-endian integer in the field.
    ///
    /// This is the verifier key a receiving member binds into its nullifier
    /// when proving to the organization owning this address.
    pub fn to_field(&self) -> FieldElement {
        FieldElement::reduce_be_bytes(&self.to_bytes())
    }
}

impl_validating_deserialize!(SettlementAddress);

impl std::fmt::Display for SettlementAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SettlementAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Public routing handle `<settlement_address>_<random suffix>`.
///
/// The embedded address identifies the member's organization; the suffix
/// (a UUID v4 when generated here) makes the handle globally unique without
/// revealing anything else about the member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    /// Parse and validate a reference number.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty("receiver_reference_number"));
        }
        let (address, suffix) =
            trimmed
                .split_once('_')
                .ok_or_else(|| ValidationError::InvalidReference {
                    value: raw.clone(),
                    reason: "missing '_' separator".to_string(),
                })?;
        if suffix.is_empty() {
            return Err(ValidationError::InvalidReference {
                value: raw.clone(),
                reason: "empty suffix".to_string(),
            });
        }
        let address =
            SettlementAddress::new(address).map_err(|e| ValidationError::InvalidReference {
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self(format!("{address}_{suffix}")))
    }

    /// Generate a fresh reference number for a member of the organization
    /// owning `address`.
    pub fn generate(address: &SettlementAddress) -> Self {
        Self(format!("{address}_{}", Uuid::new_v4()))
    }

    /// The settlement address embedded in this reference.
    pub fn settlement_address(&self) -> SettlementAddress {
        // Constructors guarantee a valid address before the first '_'.
        let prefix = self.0.split('_').next().unwrap_or_default();
        SettlementAddress(prefix.to_string())
    }

    /// The full handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_validating_deserialize!(ReferenceNumber);

impl std::fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Secret-derivation inputs
// ---------------------------------------------------------------------------

/// Organization-scoped opaque member key. Never the raw email.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Wrap an existing opaque key.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::Empty("identity_key"));
        }
        Ok(Self(raw))
    }

    /// Derive the key for `email` within organization `org`:
    /// `hex(SHA-256(org_id ‖ ":" ‖ lowercase(trim(email))))`.
    pub fn derive(org: &OrgId, email: &str) -> Self {
        let normalised = email.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(org.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(normalised.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// The key bytes fed into secret derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The key as a string, for persistence only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityKey(<redacted>)")
    }
}

/// Per-organization salt: 32 random bytes, stored as 64 lowercase hex digits.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrgSalt(String);

impl OrgSalt {
    /// Validate a stored salt.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into().to_ascii_lowercase();
        if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidSalt(
                "expected 64 hex digits".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// Generate a fresh random salt from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The salt bytes fed into secret derivation (the hex text, UTF-8).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The salt as a string, for persistence only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl_validating_deserialize!(OrgSalt);

impl std::fmt::Debug for OrgSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OrgSalt(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_A: &str = "0x00000000000000000000000000000000000000A1";

    #[test]
    fn user_id_must_be_positive() {
        assert!(UserId::new(0).is_err());
        assert!(UserId::new(-5).is_err());
        assert_eq!(UserId::new(2001).unwrap().get(), 2001);
        assert!(serde_json::from_str::<UserId>("0").is_err());
    }

    #[test]
    fn address_is_normalised_to_lowercase() {
        let a = SettlementAddress::new(ADDR_A).unwrap();
        assert_eq!(a.as_str(), "0x00000000000000000000000000000000000000a1");
        assert_eq!(a.to_bytes()[19], 0xa1);
        assert_eq!(a.to_field(), FieldElement::from_u64(0xa1));
    }

    #[test]
    fn address_rejects_bad_shapes() {
        assert!(SettlementAddress::new("0x1234").is_err());
        assert!(SettlementAddress::new("00000000000000000000000000000000000000a1ff").is_err());
        assert!(SettlementAddress::new("0xZZ000000000000000000000000000000000000a1").is_err());
    }

    #[test]
    fn reference_number_embeds_address() {
        let r = ReferenceNumber::new(format!("{ADDR_A}_5f0c2a8e-uuid")).unwrap();
        assert_eq!(
            r.settlement_address(),
            SettlementAddress::new(ADDR_A).unwrap()
        );
        assert!(r.as_str().starts_with("0x00000000000000000000000000000000000000a1_"));
    }

    #[test]
    fn reference_number_rejects_missing_parts() {
        assert!(matches!(
            ReferenceNumber::new(""),
            Err(ValidationError::Empty(_))
        ));
        assert!(ReferenceNumber::new(ADDR_A).is_err());
        assert!(ReferenceNumber::new(format!("{ADDR_A}_")).is_err());
        assert!(ReferenceNumber::new("0xORGB_uuid-1").is_err());
    }

    #[test]
    fn generated_references_are_unique() {
        let a = SettlementAddress::new(ADDR_A).unwrap();
        let r1 = ReferenceNumber::generate(&a);
        let r2 = ReferenceNumber::generate(&a);
        assert_ne!(r1, r2);
        assert_eq!(ReferenceNumber::new(r1.as_str()).unwrap(), r1);
    }

    #[test]
    fn identity_key_derivation_normalises_email() {
        let org = OrgId::new();
        let a = IdentityKey::derive(&org, "  Alice@Example.com ");
        let b = IdentityKey::derive(&org, "alice@example.com");
        assert_eq!(a, b);
        assert_ne!(a, IdentityKey::derive(&OrgId::new(), "alice@example.com"));
        assert!(!a.expose().contains('@'));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let key = IdentityKey::new("opaque").unwrap();
        assert!(!format!("{key:?}").contains("opaque"));
        let salt = OrgSalt::generate();
        assert!(!format!("{salt:?}").contains(salt.expose()));
    }

    #[test]
    fn salt_validation() {
        assert!(OrgSalt::new("abc").is_err());
        let s = OrgSalt::generate();
        assert_eq!(OrgSalt::new(s.expose()).unwrap(), s);
    }
}
