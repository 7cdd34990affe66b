use std::cell::RefCell;
use std::collections::BTreeSet;

use candid::{CandidType, Nat, Principal};
use forwarder::status::resolve_from_block;
use forwarder::{
    parse_address, Address, ForwardRequestBuilder, ForwarderDomain, DEFAULT_CHAIN_ID,
    DEFAULT_FORWARDER_NAME,
};
use ic_cdk::api::caller;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

thread_local! {
    static STATE: RefCell<Option<RelayerState>> = RefCell::new(None);
}

#[derive(Clone, Debug, Default, CandidType, Deserialize, Serialize)]
pub struct RelayerState {
    pub admins: BTreeSet<Principal>,
    pub config: RelayerConfig,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct RelayerConfig {
    pub relayer_key_name: Option<String>,
    pub relayer_derivation_path: Vec<Vec<u8>>,
    pub relayer_address: Option<String>,
    pub forwarder_address: Option<String>,
    pub forwarder_name: String,
    pub claim_address: Option<String>,
    pub verifier_address: Option<String>,
    pub token_address: Option<String>,
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    pub rpc_canister: Option<Principal>,
    pub from_block: Option<String>,
    pub threshold_wei: Nat,
    pub max_fee_multiplier: f64,
    pub priority_multiplier: f64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            relayer_key_name: None,
            relayer_derivation_path: Vec::new(),
            relayer_address: None,
            forwarder_address: None,
            forwarder_name: DEFAULT_FORWARDER_NAME.to_string(),
            claim_address: None,
            verifier_address: None,
            token_address: None,
            chain_id: DEFAULT_CHAIN_ID,
            rpc_url: None,
            rpc_canister: None,
            from_block: None,
            threshold_wei: Nat::from(0u32),
            max_fee_multiplier: 2.0,
            priority_multiplier: 1.2,
        }
    }
}

#[derive(Clone, Debug, Default, CandidType, Deserialize)]
pub struct InitArgs {
    pub admins: Vec<Principal>,
    pub relayer_key_name: Option<String>,
    pub relayer_derivation_path: Option<Vec<Vec<u8>>>,
    pub forwarder_address: Option<String>,
    pub forwarder_name: Option<String>,
    pub claim_address: Option<String>,
    pub verifier_address: Option<String>,
    pub token_address: Option<String>,
    pub chain_id: Option<u64>,
    pub rpc_url: Option<String>,
    pub rpc_canister: Option<Principal>,
    pub from_block: Option<String>,
    pub threshold_wei: Option<Nat>,
    pub max_fee_multiplier: Option<f64>,
    pub priority_multiplier: Option<f64>,
}

/// Everything one relay call needs, resolved and validated up front.
#[derive(Clone, Debug)]
pub struct RelayContext {
    pub chain_id: u64,
    pub forwarder: Address,
    pub forwarder_name: String,
    pub claim: Address,
    pub relayer: Address,
    pub key_name: String,
    pub derivation_path: Vec<Vec<u8>>,
    pub threshold_wei: BigUint,
    pub max_fee_multiplier: f64,
    pub priority_multiplier: f64,
}

impl RelayContext {
    pub fn request_builder(&self) -> ForwardRequestBuilder {
        ForwardRequestBuilder::new(ForwarderDomain::new(
            self.forwarder_name.clone(),
            self.chain_id,
            self.forwarder,
        ))
    }
}

#[derive(Clone, Debug)]
pub struct StatusContext {
    pub verifier: Address,
    pub token: Option<Address>,
    pub from_block: u64,
}

impl RelayerConfig {
    pub fn from_init(args: InitArgs) -> RelayResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            relayer_key_name: non_blank(args.relayer_key_name),
            relayer_derivation_path: args.relayer_derivation_path.unwrap_or_default(),
            relayer_address: None,
            forwarder_address: normalize_optional("forwarder_address", args.forwarder_address)?,
            forwarder_name: non_blank(args.forwarder_name).unwrap_or(defaults.forwarder_name),
            claim_address: normalize_optional("claim_address", args.claim_address)?,
            verifier_address: normalize_optional("verifier_address", args.verifier_address)?,
            token_address: normalize_optional("token_address", args.token_address)?,
            chain_id: args.chain_id.unwrap_or(defaults.chain_id),
            rpc_url: non_blank(args.rpc_url),
            rpc_canister: args.rpc_canister,
            from_block: non_blank(args.from_block),
            threshold_wei: args.threshold_wei.unwrap_or(defaults.threshold_wei),
            max_fee_multiplier: args
                .max_fee_multiplier
                .unwrap_or(defaults.max_fee_multiplier),
            priority_multiplier: args
                .priority_multiplier
                .unwrap_or(defaults.priority_multiplier),
        })
    }

    /// Checked in a fixed order: relayer key, forwarder, claim target. A
    /// missing relayer key covers both an unnamed key and a key whose
    /// address has not been derived yet.
    pub fn relay_context(&self) -> RelayResult<RelayContext> {
        let key_name = self
            .relayer_key_name
            .clone()
            .ok_or(RelayError::ConfigurationMissing {
                field: "relayer_key_name",
            })?;
        let relayer = required_address("relayer_address", self.relayer_address.as_deref())?;
        let forwarder = required_address("forwarder_address", self.forwarder_address.as_deref())?;
        let claim = required_address("claim_address", self.claim_address.as_deref())?;
        Ok(RelayContext {
            chain_id: self.chain_id,
            forwarder,
            forwarder_name: self.forwarder_name.clone(),
            claim,
            relayer,
            key_name,
            derivation_path: self.relayer_derivation_path.clone(),
            threshold_wei: self.threshold_wei.0.clone(),
            max_fee_multiplier: self.max_fee_multiplier,
            priority_multiplier: self.priority_multiplier,
        })
    }

    pub fn status_context(&self) -> RelayResult<StatusContext> {
        let verifier = required_address("verifier_address", self.verifier_address.as_deref())?;
        let token = match self.token_address.as_deref() {
            Some(value) => Some(parse_configured("token_address", value)?),
            None => None,
        };
        Ok(StatusContext {
            verifier,
            token,
            from_block: resolve_from_block(self.from_block.as_deref()),
        })
    }
}

pub fn state_mut<T>(f: impl FnOnce(&mut RelayerState) -> T) -> T {
    STATE.with(|cell| {
        let mut guard = cell.borrow_mut();
        let state = guard.as_mut().expect("relayer state not initialized");
        f(state)
    })
}

pub fn state_ref<T>(f: impl FnOnce(&RelayerState) -> T) -> T {
    STATE.with(|cell| {
        let guard = cell.borrow();
        let state = guard.as_ref().expect("relayer state not initialized");
        f(state)
    })
}

pub fn replace_state(state: Option<RelayerState>) {
    STATE.with(|cell| *cell.borrow_mut() = state);
}

pub fn snapshot_state() -> Option<RelayerState> {
    STATE.with(|cell| cell.borrow().clone())
}

pub fn config_snapshot() -> RelayerConfig {
    state_ref(|state| state.config.clone())
}

pub fn ensure_admin() -> RelayResult<()> {
    let caller = caller();
    state_ref(|state| {
        if state.admins.contains(&caller) {
            Ok(())
        } else {
            Err(RelayError::NotAuthorized)
        }
    })
}

/// Validates an address (EIP-55 checksum enforced when mixed case) and
/// returns its checksummed form for storage.
pub fn normalize_address(field: &'static str, value: &str) -> RelayResult<String> {
    Ok(parse_configured(field, value)?.to_checksum(None))
}

fn normalize_optional(field: &'static str, value: Option<String>) -> RelayResult<Option<String>> {
    non_blank(value)
        .map(|v| normalize_address(field, &v))
        .transpose()
}

fn required_address(field: &'static str, value: Option<&str>) -> RelayResult<Address> {
    let value = value.ok_or(RelayError::ConfigurationMissing { field })?;
    parse_configured(field, value)
}

fn parse_configured(field: &'static str, value: &str) -> RelayResult<Address> {
    parse_address(value).map_err(|err| RelayError::InvalidConfiguration {
        field,
        reason: err.to_string(),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
