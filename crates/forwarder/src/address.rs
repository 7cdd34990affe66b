use std::str::FromStr;

use alloy_primitives::Address;
use k256::ecdsa::VerifyingKey;

use crate::{ForwarderError, Result};

/// Accepts an all-lowercase, all-uppercase or correctly checksummed
/// `0x`-prefixed address. Mixed case that fails EIP-55 is rejected.
pub fn parse_address(value: &str) -> Result<Address> {
    let trimmed = value.trim();
    let invalid = |reason| ForwarderError::InvalidAddress {
        value: trimmed.to_string(),
        reason,
    };
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    if digits.len() != 40 {
        return Err(invalid("expected 40 hex digits"));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid("not hex"));
    }

    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(trimmed, None)
            .map_err(|_| ForwarderError::ChecksumMismatch(trimmed.to_string()));
    }
    Address::from_str(trimmed).map_err(|_| invalid("not hex"))
}

pub fn address_of(key: &VerifyingKey) -> Address {
    Address::from_public_key(key)
}
