pub fn keccak256(input: &[u8]) -> [u8; 32] {
    alloy_primitives::keccak256(input).0
}

pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn parse_hex_bytes(value: &str) -> crate::Result<Vec<u8>> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| crate::ForwarderError::InvalidHex(trimmed.to_string()))?;
    hex::decode(digits).map_err(|_| crate::ForwarderError::InvalidHex(trimmed.to_string()))
}
