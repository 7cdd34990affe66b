//! EIP-712 typed data for the ERC-2771 forwarder's `ForwardRequest`.
//!
//! Client and relay rebuild the same [`TypedForwardRequest`] from the same
//! inputs and must arrive at the same signing hash.

use alloy_primitives::aliases::U48;
use alloy_primitives::{Address, U256};
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolStruct};
use serde_json::{json, Value};

use crate::hash::to_hex_prefixed;
use crate::signature::Signature;
use crate::{ForwarderError, Result};

pub const DOMAIN_VERSION: &str = "1";
pub const DEFAULT_FORWARDER_NAME: &str = "AdmapuForwarder";

sol! {
    /// The signed message. The execution tuple ([`ForwardRequestData`])
    /// leaves `nonce` out because the forwarder reads it from storage.
    #[derive(Debug, PartialEq, Eq)]
    struct ForwardRequest {
        address from;
        address to;
        uint256 value;
        uint256 gas;
        uint256 nonce;
        uint48 deadline;
        bytes data;
    }
}

/// Unix timestamp carried as the forwarder's `uint48 deadline`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(u64);

impl Deadline {
    pub const MAX: u64 = (1 << 48) - 1;

    pub fn new(seconds: u64) -> Result<Self> {
        if seconds > Self::MAX {
            return Err(ForwarderError::OutOfRange {
                field: "deadline",
                bits: 48,
            });
        }
        Ok(Self(seconds))
    }

    pub fn from_decimal(value: &str) -> Result<Self> {
        let seconds = value
            .trim()
            .parse::<u64>()
            .map_err(|_| ForwarderError::InvalidNumber {
                field: "deadline",
                value: value.to_string(),
            })?;
        Self::new(seconds)
    }

    /// `now + window`, saturating at the 48-bit ceiling.
    pub fn after(now: u64, window_secs: u64) -> Self {
        Self(now.saturating_add(window_secs).min(Self::MAX))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// A request is invalid strictly after its deadline.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.0
    }
}

impl From<Deadline> for U48 {
    fn from(deadline: Deadline) -> Self {
        U48::from(deadline.0)
    }
}

impl From<U48> for Deadline {
    fn from(value: U48) -> Self {
        Deadline(value.to::<u64>())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwarderDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ForwarderDomain {
    pub fn new(name: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.into(),
            version: DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn to_eip712(&self) -> Eip712Domain {
        eip712_domain! {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        self.to_eip712().separator().0
    }
}

impl ForwardRequest {
    pub fn expires_at(&self) -> Deadline {
        Deadline::from(self.deadline)
    }

    pub fn with_signature(&self, signature: Signature) -> ForwardRequestData {
        ForwardRequestData {
            from: self.from,
            to: self.to,
            value: self.value,
            gas: self.gas,
            deadline: self.expires_at(),
            data: self.data.to_vec(),
            signature,
        }
    }
}

/// The tuple the forwarder's `verify` and `execute` take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRequestData {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: U256,
    pub deadline: Deadline,
    pub data: Vec<u8>,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedForwardRequest {
    pub domain: ForwarderDomain,
    pub message: ForwardRequest,
}

impl TypedForwardRequest {
    pub fn signing_hash(&self) -> [u8; 32] {
        self.message
            .eip712_signing_hash(&self.domain.to_eip712())
            .0
    }

    pub fn recover_signer(&self, signature: &Signature) -> Result<Address> {
        signature.recover(&self.signing_hash())
    }

    /// JSON document accepted by `eth_signTypedData_v4`. Integers are
    /// decimal strings so wallets never see lossy JSON numbers.
    pub fn to_typed_data_json(&self) -> Value {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "ForwardRequest": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "gas", "type": "uint256" },
                    { "name": "nonce", "type": "uint256" },
                    { "name": "deadline", "type": "uint48" },
                    { "name": "data", "type": "bytes" },
                ],
            },
            "primaryType": "ForwardRequest",
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract.to_checksum(None),
            },
            "message": {
                "from": self.message.from.to_checksum(None),
                "to": self.message.to.to_checksum(None),
                "value": self.message.value.to_string(),
                "gas": self.message.gas.to_string(),
                "nonce": self.message.nonce.to_string(),
                "deadline": self.message.expires_at().as_secs().to_string(),
                "data": to_hex_prefixed(&self.message.data),
            },
        })
    }
}

/// Builds typed forward requests for one forwarder deployment.
#[derive(Clone, Debug)]
pub struct ForwardRequestBuilder {
    domain: ForwarderDomain,
}

impl ForwardRequestBuilder {
    pub fn new(domain: ForwarderDomain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &ForwarderDomain {
        &self.domain
    }

    /// A zero-value forward request from `from` to `to` carrying `data`.
    pub fn build(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
        gas: U256,
        deadline: Deadline,
        nonce: U256,
    ) -> TypedForwardRequest {
        TypedForwardRequest {
            domain: self.domain.clone(),
            message: ForwardRequest {
                from,
                to,
                value: U256::ZERO,
                gas,
                nonce,
                deadline: deadline.into(),
                data: data.into(),
            },
        }
    }

    pub fn claim(
        &self,
        from: Address,
        claim_contract: Address,
        gas: U256,
        deadline: Deadline,
        nonce: U256,
    ) -> TypedForwardRequest {
        self.build(
            from,
            claim_contract,
            crate::contracts::claim_calldata(),
            gas,
            deadline,
            nonce,
        )
    }
}
