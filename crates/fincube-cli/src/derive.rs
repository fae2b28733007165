//! # Derivation Subcommands
//!
//! Offline helpers that recompute the engine's field values from their
//! inputs, for checking a ledger row or a proof's public inputs by hand.
//!
//! - `fincube secret` — member secret from identity key and org salt.
//! - `fincube nullifier` — nullifier from a secret and the paying
//!   organization's address.
//! - `fincube commitment` — commitment hash of a batch polynomial, given
//!   either its coefficients or its member roots.
//!
//! Values are printed as `0x`-prefixed 64-digit hex, one per line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use fincube_batch::{build_polynomial, commitment_hash};
use fincube_core::{FieldElement, IdentityKey, OrgId, OrgSalt, SettlementAddress};
use fincube_crypto::{derive_secret, nullifier};
use uuid::Uuid;

/// Arguments for `fincube secret`.
#[derive(Args, Debug)]
pub struct SecretArgs {
    /// Opaque identity key as stored in the ledger.
    #[arg(long, conflicts_with = "email", required_unless_present = "email")]
    pub identity_key: Option<String>,

    /// Derive the identity key from this email instead.
    #[arg(long, requires = "org_id")]
    pub email: Option<String>,

    /// Organization id scoping the email.
    #[arg(long)]
    pub org_id: Option<Uuid>,

    /// Organization salt, 64 hex digits.
    #[arg(long)]
    pub salt: String,
}

/// Arguments for `fincube nullifier`.
#[derive(Args, Debug)]
pub struct NullifierArgs {
    /// Member secret (0x-hex or decimal).
    #[arg(long)]
    pub secret: FieldElement,

    /// Settlement address of the paying organization.
    #[arg(long)]
    pub verifier: SettlementAddress,
}

/// Arguments for `fincube commitment`.
#[derive(Args, Debug)]
pub struct CommitmentArgs {
    /// JSON array of the batch's padded coefficients, lowest degree first.
    #[arg(long, conflicts_with = "roots", required_unless_present = "roots")]
    pub coefficients: Option<PathBuf>,

    /// JSON array of member secrets; the polynomial is built from them.
    #[arg(long)]
    pub roots: Option<PathBuf>,
}

pub fn compute_secret(args: &SecretArgs) -> Result<FieldElement> {
    let salt = OrgSalt::new(args.salt.as_str()).context("--salt")?;
    let key = match (&args.identity_key, &args.email, args.org_id) {
        (Some(key), _, _) => IdentityKey::new(key.as_str()).context("--identity-key")?,
        (None, Some(email), Some(org)) => IdentityKey::derive(&OrgId::from_uuid(org), email),
        _ => bail!("either --identity-key or --email with --org-id is required"),
    };
    Ok(derive_secret(&key, &salt))
}

pub fn compute_nullifier(args: &NullifierArgs) -> Result<FieldElement> {
    Ok(nullifier(&args.secret, &args.verifier.to_field())?)
}

pub fn compute_commitment(args: &CommitmentArgs) -> Result<FieldElement> {
    let coefficients = match (&args.coefficients, &args.roots) {
        (Some(path), _) => read_field_array(path)?,
        (None, Some(path)) => build_polynomial(&read_field_array(path)?)?,
        (None, None) => bail!("either --coefficients or --roots is required"),
    };
    Ok(commitment_hash(&coefficients)?)
}

pub fn run_secret(args: &SecretArgs) -> Result<u8> {
    println!("{}", compute_secret(args)?.to_hex());
    Ok(0)
}

pub fn run_nullifier(args: &NullifierArgs) -> Result<u8> {
    println!("{}", compute_nullifier(args)?.to_hex());
    Ok(0)
}

pub fn run_commitment(args: &CommitmentArgs) -> Result<u8> {
    println!("{}", compute_commitment(args)?.to_hex());
    Ok(0)
}

fn read_field_array(path: &Path) -> Result<Vec<FieldElement>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of field elements", path.display()))
}
