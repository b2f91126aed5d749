//! EVM-style `0x` hex addresses with EIP-55 mixed-case checksums.

use sha3::{Digest, Keccak256};

use crate::error::{IdentityError, Result};

pub const H160_LEN: usize = 20;

/// Parses a `0x`-prefixed 20-byte hex address.
///
/// All-lowercase and all-uppercase digits are accepted as-is; mixed case must
/// carry a valid EIP-55 checksum.
pub fn decode(address: &str) -> Result<[u8; H160_LEN]> {
    let invalid = |reason: &str| IdentityError::InvalidAddressFormat(format!("{}: {}", address, reason));

    let digits = address.strip_prefix("0x").ok_or_else(|| invalid("missing 0x prefix"))?;
    if digits.len() != H160_LEN * 2 {
        return Err(invalid("expected 40 hex digits"));
    }

    let bytes = hex::decode(digits).map_err(|_| invalid("not hex"))?;
    let mut out = [0u8; H160_LEN];
    out.copy_from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&out) != address {
        return Err(invalid("bad EIP-55 checksum"));
    }

    Ok(out)
}

/// Renders the EIP-55 checksummed form.
pub fn to_checksum(address: &[u8; H160_LEN]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
