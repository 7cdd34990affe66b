//! Read-only snapshots used to gate the claim affordance. Recomputed on
//! every request and never cached.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FROM_BLOCK: u64 = 10_320_000;
pub const FALLBACK_FROM_BLOCK: u64 = 9_981_114;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "<18")]
    Under18,
    #[serde(rename = "18-64")]
    Adult,
    #[serde(rename = "65+")]
    Senior,
}

impl AgeBucket {
    pub fn from_flags(over18: bool, over65: bool) -> Self {
        if over65 {
            AgeBucket::Senior
        } else if over18 {
            AgeBucket::Adult
        } else {
            AgeBucket::Under18
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBucket::Under18 => "<18",
            AgeBucket::Adult => "18-64",
            AgeBucket::Senior => "65+",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "amount", rename_all = "camelCase")]
pub enum TokenBalance {
    NotConfigured,
    Unavailable,
    Amount(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub verified: bool,
    pub over18: bool,
    pub over65: bool,
    pub age_bucket: AgeBucket,
    pub token_balance: TokenBalance,
}

impl UserStatus {
    pub fn can_claim(&self) -> bool {
        self.verified
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub chain_id: u64,
    pub latest_block: u64,
    pub minting_paused: bool,
    pub verified_events: u64,
    pub revoked_events: u64,
    pub unique_verified_wallets: u64,
    pub unique_revoked_wallets: u64,
    pub from_block: u64,
}

/// Formats a raw token amount with `decimals` fractional digits, trimming
/// trailing zeros and omitting the point for whole amounts.
pub fn format_units(value: &U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let digits = value.to_string();
    let decimals = decimals as usize;
    let (integer, fraction) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() || value.is_zero() {
        integer
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// Event-scan starting block from configuration. Unset or blank uses the
/// default; a value that does not parse uses the fallback. Decimal and
/// `0x` hex are accepted.
pub fn resolve_from_block(raw: Option<&str>) -> u64 {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return DEFAULT_FROM_BLOCK,
    };
    let parsed = match raw.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => raw.parse::<u64>(),
    };
    parsed.unwrap_or(FALLBACK_FROM_BLOCK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_bucket_prefers_highest_flag() {
        assert_eq!(AgeBucket::from_flags(true, true), AgeBucket::Senior);
        assert_eq!(AgeBucket::from_flags(true, false), AgeBucket::Adult);
        assert_eq!(AgeBucket::from_flags(false, false), AgeBucket::Under18);
        assert_eq!(AgeBucket::from_flags(false, true).label(), "65+");
    }

    #[test]
    fn formats_units_like_wallets() {
        let wei = |v: u128| U256::from(v);
        assert_eq!(format_units(&wei(1_500_000_000_000_000_000), 18), "1.5");
        assert_eq!(format_units(&wei(1_000_000_000_000_000_000), 18), "1");
        assert_eq!(format_units(&wei(1), 18), "0.000000000000000001");
        assert_eq!(format_units(&wei(0), 18), "0");
        assert_eq!(format_units(&wei(12_345), 2), "123.45");
        assert_eq!(format_units(&wei(12_345), 0), "12345");
    }

    #[test]
    fn from_block_fallbacks() {
        assert_eq!(resolve_from_block(None), DEFAULT_FROM_BLOCK);
        assert_eq!(resolve_from_block(Some("  ")), DEFAULT_FROM_BLOCK);
        assert_eq!(resolve_from_block(Some("12")), 12);
        assert_eq!(resolve_from_block(Some("0x10")), 16);
        assert_eq!(resolve_from_block(Some("latest")), FALLBACK_FROM_BLOCK);
    }

    #[test]
    fn status_json_shape() {
        let status = UserStatus {
            verified: true,
            over18: true,
            over65: false,
            age_bucket: AgeBucket::Adult,
            token_balance: TokenBalance::Amount("12.5".to_string()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ageBucket"], "18-64");
        assert_eq!(json["tokenBalance"]["state"], "amount");
        assert_eq!(json["tokenBalance"]["amount"], "12.5");
        assert!(status.can_claim());
    }
}
