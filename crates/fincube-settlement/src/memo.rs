//! # Settlement Memo
//!
//! The structured record submitted with every cross-organization
//! settlement. It is a versioned, typed struct encoded with JCS, so its
//! byte length is deterministic and the size limit is checked against
//! exactly what the contract receives. An oversized memo is an error,
//! never truncated.

use fincube_core::{
    CanonicalBytes, CanonicalizationError, ErrorKind, ReferenceNumber, SettlementAddress,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest encoded memo the contract accepts.
pub const MEMO_MAX_BYTES: usize = 1024;

/// Current memo schema version.
pub const MEMO_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum MemoError {
    #[error("memo is {size} bytes, limit is {max}")]
    TooLong { size: usize, max: usize },

    #[error("memo encoding failed: {0}")]
    Encoding(#[from] CanonicalizationError),
}

impl MemoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooLong { .. } => ErrorKind::MemoTooLong,
            Self::Encoding(_) => ErrorKind::InternalError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMemo {
    pub v: u32,
    /// Ledger amount in whole token units, as a decimal string.
    pub amount: String,
    pub sender_ref: ReferenceNumber,
    pub receiver_ref: ReferenceNumber,
    pub sender_address: SettlementAddress,
    pub receiver_address: SettlementAddress,
    /// Rendered `YYYY-MM-DDTHH:MM:SSZ`.
    pub timestamp: String,
}

impl SettlementMemo {
    pub fn new(
        sender_ref: ReferenceNumber,
        receiver_ref: ReferenceNumber,
        sender_address: SettlementAddress,
        receiver_address: SettlementAddress,
        amount: u64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            v: MEMO_VERSION,
            amount: amount.to_string(),
            sender_ref,
            receiver_ref,
            sender_address,
            receiver_address,
            timestamp: timestamp.to_iso8601(),
        }
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Result<CanonicalBytes, MemoError> {
        Ok(CanonicalBytes::new(self)?)
    }

    /// Canonical encoding, failing with `TooLong` above `max` bytes.
    pub fn encode_bounded(&self, max: usize) -> Result<String, MemoError> {
        let bytes = self.encode()?;
        check_size(&bytes, max)?;
        Ok(bytes.as_str().to_string())
    }
}

/// Reject encodings longer than `max` bytes.
pub fn check_size(encoded: &CanonicalBytes, max: usize) -> Result<(), MemoError> {
    if encoded.len() > max {
        return Err(MemoError::TooLong {
            size: encoded.len(),
            max,
        });
    }
    Ok(())
}
