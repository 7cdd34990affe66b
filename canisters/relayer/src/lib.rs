//! Gasless claim relay canister: checks ERC-2771 forward requests against
//! the forwarder and broadcasts `execute` from a threshold-ECDSA account.

/// `ic_cdk::println!` only works inside a replica; native builds log to stderr.
macro_rules! log {
    ($($arg:tt)*) => {{
        #[cfg(target_arch = "wasm32")]
        ic_cdk::println!($($arg)*);
        #[cfg(not(target_arch = "wasm32"))]
        eprintln!($($arg)*);
    }};
}
pub(crate) use log;

pub mod error;
pub mod evm;
pub mod http;
pub mod relay;
pub mod signer;
pub mod state;
pub mod status;
pub mod submitter;
pub mod transaction;
pub mod validator;

#[cfg(test)]
mod testing;

use std::collections::BTreeSet;

use candid::{Nat, Principal};
use forwarder::parse_address;
use ic_cdk::api::{caller, time};
use ic_cdk::storage::{stable_restore, stable_save};
use ic_cdk::trap;
use ic_cdk_macros::{init, post_upgrade, pre_upgrade, query, update};

use crate::error::{RelayError, RelayResult};
use crate::evm::{EvmRpc, EvmRpcCanister};
use crate::http::{HttpRequest, HttpResponse};
use crate::state::{
    config_snapshot, ensure_admin, normalize_address, replace_state, snapshot_state, state_mut,
    state_ref, InitArgs, RelayerConfig, RelayerState,
};

#[init]
fn init(args: Option<InitArgs>) {
    let args = args.unwrap_or_default();
    let mut admins: BTreeSet<Principal> = args.admins.iter().copied().collect();
    admins.insert(caller());

    let config = RelayerConfig::from_init(args).unwrap_or_else(|err| trap(&err.to_string()));
    replace_state(Some(RelayerState { admins, config }));
}

#[pre_upgrade]
fn pre_upgrade() {
    if let Err(e) = stable_save((snapshot_state(),)) {
        trap(&format!("failed to save state: {}", e));
    }
}

#[post_upgrade]
fn post_upgrade() {
    let (snapshot,): (Option<RelayerState>,) =
        stable_restore().unwrap_or_else(|e| trap(&format!("failed to restore state: {}", e)));
    replace_state(Some(snapshot.unwrap_or_default()));
}

#[query]
fn http_request(req: HttpRequest) -> HttpResponse {
    http::query_response(&req)
}

#[update]
async fn http_request_update(req: HttpRequest) -> HttpResponse {
    let now = time() / 1_000_000_000;
    http::update_response(&req, &config_snapshot(), now).await
}

#[query]
fn get_config() -> RelayerConfig {
    config_snapshot()
}

#[query]
fn get_relayer_address() -> Option<String> {
    state_ref(|state| state.config.relayer_address.clone())
}

#[update]
fn set_forwarder(address: String, name: Option<String>) {
    admin_only();
    let normalized = checked(normalize_address("forwarder_address", &address));
    state_mut(|state| {
        state.config.forwarder_address = Some(normalized);
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            state.config.forwarder_name = name.trim().to_string();
        }
    });
}

#[update]
fn set_claim_address(address: String) {
    admin_only();
    let normalized = checked(normalize_address("claim_address", &address));
    state_mut(|state| state.config.claim_address = Some(normalized));
}

#[update]
fn set_verifier_address(address: String) {
    admin_only();
    let normalized = checked(normalize_address("verifier_address", &address));
    state_mut(|state| state.config.verifier_address = Some(normalized));
}

/// `None` clears the token; user status then reports it as not configured.
#[update]
fn set_token_address(address: Option<String>) {
    admin_only();
    let normalized = address.map(|a| checked(normalize_address("token_address", &a)));
    state_mut(|state| state.config.token_address = normalized);
}

/// Switching keys forgets the derived address; call
/// `derive_relayer_address` before relaying again.
#[update]
fn set_relayer_key(key_name: String, derivation_path: Vec<Vec<u8>>) {
    admin_only();
    let key_name = key_name.trim().to_string();
    if key_name.is_empty() {
        trap("relayer key name must not be empty");
    }
    state_mut(|state| {
        state.config.relayer_key_name = Some(key_name);
        state.config.relayer_derivation_path = derivation_path;
        state.config.relayer_address = None;
    });
}

#[update]
async fn derive_relayer_address() -> Result<String, String> {
    ensure_admin().map_err(|err| err.to_string())?;
    let (key_name, path) = state_ref(|state| {
        (
            state.config.relayer_key_name.clone(),
            state.config.relayer_derivation_path.clone(),
        )
    });
    let key_name = key_name.ok_or_else(|| {
        RelayError::ConfigurationMissing {
            field: "relayer_key_name",
        }
        .to_string()
    })?;
    let address = signer::derive_address(&key_name, &path)
        .await
        .map_err(|err| err.to_string())?
        .to_checksum(None);
    log!("relayer address derived: {}", address);
    state_mut(|state| state.config.relayer_address = Some(address.clone()));
    Ok(address)
}

#[update]
fn set_rpc(canister: Principal, url: Option<String>) {
    admin_only();
    let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
    state_mut(|state| {
        state.config.rpc_canister = Some(canister);
        state.config.rpc_url = url;
    });
}

#[update]
fn set_chain_id(chain_id: u64) {
    admin_only();
    state_mut(|state| state.config.chain_id = chain_id);
}

#[update]
fn set_threshold(value: Nat) {
    admin_only();
    state_mut(|state| state.config.threshold_wei = value);
}

#[update]
fn set_fee_multipliers(max_fee_multiplier: f64, priority_multiplier: f64) {
    admin_only();
    if !(max_fee_multiplier.is_finite() && max_fee_multiplier > 0.0)
        || !(priority_multiplier.is_finite() && priority_multiplier > 0.0)
    {
        trap("fee multipliers must be positive");
    }
    state_mut(|state| {
        state.config.max_fee_multiplier = max_fee_multiplier;
        state.config.priority_multiplier = priority_multiplier;
    });
}

#[update]
fn set_from_block(from_block: Option<String>) {
    admin_only();
    state_mut(|state| state.config.from_block = from_block);
}

#[update]
async fn relayer_balance() -> Result<Nat, String> {
    relayer_balance_internal()
        .await
        .map_err(|err| err.to_string())
}

async fn relayer_balance_internal() -> RelayResult<Nat> {
    let config = config_snapshot();
    let relayer = config
        .relayer_address
        .as_deref()
        .ok_or(RelayError::ConfigurationMissing {
            field: "relayer_address",
        })
        .and_then(|a| Ok(parse_address(a)?))?;
    let rpc = EvmRpcCanister::from_config(&config)?;
    Ok(Nat(rpc.balance(&relayer).await?))
}

fn admin_only() {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
}

fn checked<T>(result: RelayResult<T>) -> T {
    result.unwrap_or_else(|err| trap(&err.to_string()))
}
