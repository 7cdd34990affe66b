//! Calldata and decoding for the contracts the relay talks to: the
//! forwarder, the claim target, the age verifier and the reward token.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, Revert, SolCall, SolError, SolEvent, SolValue};

use crate::eip712::ForwardRequestData;
use crate::hash::to_hex_prefixed;
use crate::signature::Signature;
use crate::Result;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IForwarder {
        struct ForwardRequestData {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint48 deadline;
            bytes data;
            bytes signature;
        }

        function nonces(address owner) external view returns (uint256);
        function verify(ForwardRequestData request) external view returns (bool);
        function execute(ForwardRequestData request) external payable;

        error ERC2771ForwarderInvalidSigner(address signer, address from);
        error ERC2771ForwarderExpiredRequest(uint48 deadline);
        error ERC2771UntrustfulTarget(address target, address forwarder);
        error ERC2771ForwarderMismatchedValue(uint256 requestedValue, uint256 msgValue);
    }

    interface IClaim {
        function claim() external;
    }

    interface IAgeVerifier {
        function isVerified(address user) external view returns (bool);
        function isOver18(address user) external view returns (bool);
        function isOver65(address user) external view returns (bool);

        event AddressVerified(address indexed user, uint256 timestamp);
        event VerificationRevoked(address indexed user, uint256 timestamp);
    }

    interface IRewardToken {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function mintingPaused() external view returns (bool);
    }
}

pub use IAgeVerifier::{AddressVerified, VerificationRevoked};

impl ForwardRequestData {
    pub fn to_sol(&self) -> IForwarder::ForwardRequestData {
        IForwarder::ForwardRequestData {
            from: self.from,
            to: self.to,
            value: self.value,
            gas: self.gas,
            deadline: self.deadline.into(),
            data: self.data.clone().into(),
            signature: self.signature.to_bytes().to_vec().into(),
        }
    }

    pub fn from_sol(raw: &IForwarder::ForwardRequestData) -> Result<Self> {
        Ok(Self {
            from: raw.from,
            to: raw.to,
            value: raw.value,
            gas: raw.gas,
            deadline: raw.deadline.into(),
            data: raw.data.to_vec(),
            signature: Signature::from_bytes(&raw.signature)?,
        })
    }
}

/// Inner call carried by every claim forward request.
pub fn claim_calldata() -> Vec<u8> {
    IClaim::claimCall {}.abi_encode()
}

pub fn nonces_calldata(owner: &Address) -> Vec<u8> {
    IForwarder::noncesCall { owner: *owner }.abi_encode()
}

pub fn verify_calldata(request: &ForwardRequestData) -> Vec<u8> {
    IForwarder::verifyCall {
        request: request.to_sol(),
    }
    .abi_encode()
}

pub fn execute_calldata(request: &ForwardRequestData) -> Vec<u8> {
    IForwarder::executeCall {
        request: request.to_sol(),
    }
    .abi_encode()
}

pub fn decode_execute(calldata: &[u8]) -> Result<ForwardRequestData> {
    let call = IForwarder::executeCall::abi_decode(calldata, true)?;
    ForwardRequestData::from_sol(&call.request)
}

pub fn address_flag_calldata(flag: VerifierFlag, user: &Address) -> Vec<u8> {
    let user = *user;
    match flag {
        VerifierFlag::Verified => IAgeVerifier::isVerifiedCall { user }.abi_encode(),
        VerifierFlag::Over18 => IAgeVerifier::isOver18Call { user }.abi_encode(),
        VerifierFlag::Over65 => IAgeVerifier::isOver65Call { user }.abi_encode(),
    }
}

pub fn balance_of_calldata(account: &Address) -> Vec<u8> {
    IRewardToken::balanceOfCall { account: *account }.abi_encode()
}

pub fn decimals_calldata() -> Vec<u8> {
    IRewardToken::decimalsCall {}.abi_encode()
}

pub fn minting_paused_calldata() -> Vec<u8> {
    IRewardToken::mintingPausedCall {}.abi_encode()
}

/// Return data of any `bool` view (`verify`, the verifier flags,
/// `mintingPaused`).
pub fn decode_bool(data: &[u8]) -> Result<bool> {
    Ok(<bool as SolValue>::abi_decode(data, true)?)
}

/// Return data of any `uint256` view (`nonces`, `balanceOf`).
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    Ok(<U256 as SolValue>::abi_decode(data, true)?)
}

pub fn decode_decimals(data: &[u8]) -> Result<u8> {
    Ok(<alloy_sol_types::sol_data::Uint<8> as alloy_sol_types::SolType>::abi_decode(data, true)?)
}

pub fn address_verified_topic() -> [u8; 32] {
    AddressVerified::SIGNATURE_HASH.0
}

pub fn verification_revoked_topic() -> [u8; 32] {
    VerificationRevoked::SIGNATURE_HASH.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifierFlag {
    Verified,
    Over18,
    Over65,
}

/// Human-readable form of revert data. Known forwarder errors and
/// `Error(string)` are decoded; anything else is returned as hex.
pub fn describe_revert(data: &[u8]) -> String {
    use IForwarder::{
        ERC2771ForwarderExpiredRequest, ERC2771ForwarderInvalidSigner,
        ERC2771ForwarderMismatchedValue, ERC2771UntrustfulTarget,
    };

    if let Ok(revert) = Revert::abi_decode(data, true) {
        return format!("execution reverted: {}", revert.reason);
    }
    if let Ok(err) = ERC2771ForwarderInvalidSigner::abi_decode(data, true) {
        return format!(
            "ERC2771ForwarderInvalidSigner(signer={}, from={})",
            err.signer, err.from
        );
    }
    if let Ok(err) = ERC2771ForwarderExpiredRequest::abi_decode(data, true) {
        return format!("ERC2771ForwarderExpiredRequest(deadline={})", err.deadline);
    }
    if let Ok(err) = ERC2771UntrustfulTarget::abi_decode(data, true) {
        return format!(
            "ERC2771UntrustfulTarget(target={}, forwarder={})",
            err.target, err.forwarder
        );
    }
    if let Ok(err) = ERC2771ForwarderMismatchedValue::abi_decode(data, true) {
        return format!(
            "ERC2771ForwarderMismatchedValue(requested={}, msgValue={})",
            err.requestedValue, err.msgValue
        );
    }
    format!("execution reverted ({})", to_hex_prefixed(data))
}
