//! # SHA-256 Digest-to-Field
//!
//! Maps arbitrary bytes to a canonical field element:
//! `SHA-256(bytes)` read as a big-endian integer, reduced modulo `P`.

use fincube_core::{FieldElement, IdentityKey, OrgSalt};
use sha2::{Digest, Sha256};

/// Hash `bytes` with SHA-256 and reduce the digest into the field.
pub fn digest_to_field(bytes: &[u8]) -> FieldElement {
    let digest = Sha256::digest(bytes);
    FieldElement::reduce_be_bytes(&digest)
}

/// Derive a member's secret: `digest_to_field(identity_key ‖ org_salt)`.
///
/// Both parts are fed as their UTF-8 text (the salt in its stored hex
/// form). The result is the root the member occupies in its batch
/// polynomial. It is never persisted and never logged.
pub fn derive_secret(identity_key: &IdentityKey, salt: &OrgSalt) -> FieldElement {
    let mut hasher = Sha256::new();
    hasher.update(identity_key.as_bytes());
    hasher.update(salt.as_bytes());
    FieldElement::reduce_be_bytes(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SALT: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn empty_input_digest_is_reduced_sha256_of_empty() {
        // SHA-256("") = e3b0c442...b855, which exceeds P and must be reduced.
        let digest =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        let expected = FieldElement::reduce_be_bytes(&digest);
        assert_eq!(digest_to_field(b""), expected);
        assert_ne!(expected.to_be_bytes().to_vec(), digest);
    }

    #[test]
    fn derive_secret_matches_concatenated_digest() {
        let key = IdentityKey::new("member-key-1").unwrap();
        let salt = OrgSalt::new(SALT).unwrap();
        let mut concat = b"member-key-1".to_vec();
        concat.extend_from_slice(SALT.as_bytes());
        assert_eq!(derive_secret(&key, &salt), digest_to_field(&concat));
    }

    #[test]
    fn different_salts_give_different_secrets() {
        let key = IdentityKey::new("member-key-1").unwrap();
        let a = OrgSalt::new(SALT).unwrap();
        let b = OrgSalt::generate();
        assert_ne!(derive_secret(&key, &a), derive_secret(&key, &b));
    }

    proptest! {
        #[test]
        fn digest_to_field_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let a = digest_to_field(&bytes);
            let b = digest_to_field(&bytes.clone());
            prop_assert_eq!(a, b);
            prop_assert!(FieldElement::from_canonical_bytes(&a.to_be_bytes()).is_ok());
        }
    }
}
