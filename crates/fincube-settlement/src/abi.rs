//! # Minimal Solidity ABI Encoding
//!
//! Head/tail encoding for the handful of argument types the settlement
//! contracts take, plus decoders for their return values and revert data.
//! Selectors are the first four bytes of `keccak256(signature)`.

use sha3::{Digest, Keccak256};

/// `Error(string)` revert selector.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// A single ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address([u8; 20]),
    Uint(u128),
    Bool(bool),
    Bytes32([u8; 32]),
    Bytes(Vec<u8>),
    String(String),
    Bytes32Array(Vec<[u8; 32]>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::Bytes(_) | Self::String(_) | Self::Bytes32Array(_))
    }

    fn encode_static(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            Self::Address(a) => word[12..].copy_from_slice(a),
            Self::Uint(v) => word[16..].copy_from_slice(&v.to_be_bytes()),
            Self::Bool(b) => word[31] = u8::from(*b),
            Self::Bytes32(b) => word = *b,
            Self::Bytes(_) | Self::String(_) | Self::Bytes32Array(_) => {}
        }
        word
    }

    fn encode_tail(&self) -> Vec<u8> {
        match self {
            Self::Bytes(b) => encode_packed_bytes(b),
            Self::String(s) => encode_packed_bytes(s.as_bytes()),
            Self::Bytes32Array(items) => {
                let mut out = uint_word(items.len() as u128).to_vec();
                for item in items {
                    out.extend_from_slice(item);
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

fn uint_word(v: u128) -> [u8; 32] {
    Token::Uint(v).encode_static()
}

fn encode_packed_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = uint_word(bytes.len() as u128).to_vec();
    out.extend_from_slice(bytes);
    let pad = (32 - bytes.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(pad));
    out
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode `args` with head/tail layout.
pub fn encode(args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for arg in args {
        if arg.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(arg.encode_tail());
        } else {
            head.extend_from_slice(&arg.encode_static());
        }
    }
    head.extend(tail);
    head
}

/// Calldata for `signature(args...)`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(args));
    out
}

/// `0x`-prefixed hex of calldata.
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode `0x`-prefixed hex.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.trim_start_matches("0x"))
}

/// Read a `bool` return value.
pub fn decode_bool(data: &[u8]) -> Option<bool> {
    let word = data.get(..32)?;
    if word[..31].iter().any(|b| *b != 0) {
        return None;
    }
    match word[31] {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// Read an `address` return value.
pub fn decode_address(data: &[u8]) -> Option<[u8; 20]> {
    let word = data.get(..32)?;
    if word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Some(out)
}

/// Read the message of an `Error(string)` revert payload.
pub fn decode_error_string(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = read_usize(body.get(..32)?)?;
    let start = offset.checked_add(32)?;
    let len = read_usize(body.get(offset..start)?)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn read_usize(word: &[u8]) -> Option<usize> {
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..32]);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}
