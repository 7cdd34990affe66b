//! ERC-2771 forward requests for the gasless claim relay.
//!
//! The client and the relay canister both build requests through
//! [`ForwardRequestBuilder`] so they hash identical bytes.

mod address;
pub mod contracts;
mod eip712;
mod error;
mod hash;
pub mod relay;
mod signature;
pub mod status;

pub use address::{address_of, parse_address};
pub use alloy_primitives::{Address, U256};
pub use eip712::{
    Deadline, ForwardRequest, ForwardRequestBuilder, ForwardRequestData, ForwarderDomain,
    TypedForwardRequest, DEFAULT_FORWARDER_NAME, DOMAIN_VERSION,
};
pub use error::{ForwarderError, Result};
pub use hash::{keccak256, parse_hex_bytes, to_hex_prefixed};
pub use signature::Signature;

/// Sepolia, where the forwarder, claim, verifier and token contracts live.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;
