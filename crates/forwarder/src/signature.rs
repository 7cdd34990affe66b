use std::fmt;

use alloy_primitives::Address;
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::address_of;
use crate::hash::{parse_hex_bytes, to_hex_prefixed};
use crate::{ForwarderError, Result};

/// A 65-byte `r || s || v` secp256k1 signature as produced by
/// `eth_signTypedData_v4`. `v` is kept as sent (27/28 or 0/1).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8,
}

impl Signature {
    pub const LEN: usize = 65;

    pub fn from_parts(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(ForwarderError::InvalidLength {
                field: "signature",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        Self::from_bytes(&parse_hex_bytes(value)?)
    }

    /// Signs a 32-byte digest and returns the signature with `v` in the
    /// 27/28 convention wallets use.
    pub fn sign_prehash(key: &SigningKey, prehash: &[u8; 32]) -> Result<Self> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| ForwarderError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Self {
            r,
            s,
            v: 27 + recovery_id.to_byte(),
        })
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    pub fn v(&self) -> u8 {
        self.v
    }

    pub fn y_parity(&self) -> Result<u8> {
        match self.v {
            0 | 1 => Ok(self.v),
            27 | 28 => Ok(self.v - 27),
            other => Err(ForwarderError::InvalidRecoveryId(other)),
        }
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        to_hex_prefixed(&self.to_bytes())
    }

    pub fn recover(&self, prehash: &[u8; 32]) -> Result<Address> {
        let parity = self.y_parity()?;
        let recovery_id =
            RecoveryId::from_byte(parity).ok_or(ForwarderError::InvalidRecoveryId(self.v))?;
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature = k256::ecdsa::Signature::from_slice(&rs)
            .map_err(|e| ForwarderError::Recovery(e.to_string()))?;
        let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
            .map_err(|e| ForwarderError::Recovery(e.to_string()))?;
        Ok(address_of(&key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}
