//! JSON-RPC access to the chain through the EVM RPC canister.

use std::sync::atomic::{AtomicU64, Ordering};

use candid::{CandidType, Principal};
use forwarder::{parse_hex_bytes, to_hex_prefixed, Address, ForwarderError};
use ic_cdk::api::call::call_with_payment128;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{RelayError, RelayResult};
use crate::state::RelayerConfig;

const RPC_CALL_CYCLES: u128 = 2_000_000_000_000;
const RPC_RESPONSE_ESTIMATE: u64 = 64 * 1024;
const LOGS_RESPONSE_ESTIMATE: u64 = 2 * 1024 * 1024;
static JSON_RPC_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct RpcApi {
    pub url: String,
    pub headers: Option<Vec<HttpHeader>>,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub enum RpcService {
    Chain(u64),
    Custom(RpcApi),
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct RpcCanisterError {
    code: i64,
    message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventLog {
    pub topics: Vec<String>,
}

/// Implementors only provide `request`.
#[allow(async_fn_in_trait)]
pub trait EvmRpc {
    async fn request(&self, method: &'static str, params: Value) -> RelayResult<Value>;

    async fn call(&self, to: &Address, data: &[u8]) -> RelayResult<Vec<u8>> {
        let params = json!([
            { "to": to.to_checksum(None), "data": to_hex_prefixed(data) },
            "latest"
        ]);
        let value = self.request("eth_call", params).await?;
        Ok(parse_hex_bytes(expect_str(&value, "hex string")?)?)
    }

    async fn estimate_gas(&self, from: &Address, to: &Address, data: &[u8]) -> RelayResult<BigUint> {
        let params = json!([{
            "from": from.to_checksum(None),
            "to": to.to_checksum(None),
            "data": to_hex_prefixed(data),
        }]);
        let value = self.request("eth_estimateGas", params).await?;
        parse_quantity(expect_str(&value, "hex quantity")?)
    }

    async fn balance(&self, address: &Address) -> RelayResult<BigUint> {
        let value = self
            .request("eth_getBalance", json!([address.to_checksum(None), "latest"]))
            .await?;
        parse_quantity(expect_str(&value, "hex quantity")?)
    }

    async fn pending_transaction_count(&self, address: &Address) -> RelayResult<u64> {
        let value = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_checksum(None), "pending"]),
            )
            .await?;
        quantity_u64(&value, "transaction count")
    }

    async fn base_fee(&self) -> RelayResult<BigUint> {
        let value = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        match value {
            Value::Object(map) => {
                let base_fee = map
                    .get("baseFeePerGas")
                    .and_then(Value::as_str)
                    .ok_or(RelayError::RpcResultTypeMismatch {
                        expected: "baseFeePerGas",
                    })?;
                parse_quantity(base_fee)
            }
            _ => Err(RelayError::RpcResultTypeMismatch {
                expected: "block object",
            }),
        }
    }

    async fn max_priority_fee(&self) -> RelayResult<BigUint> {
        let value = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
        parse_quantity(expect_str(&value, "hex quantity")?)
    }

    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> RelayResult<String> {
        let value = self
            .request("eth_sendRawTransaction", json!([to_hex_prefixed(raw_tx)]))
            .await?;
        expect_str(&value, "transaction hash").map(str::to_string)
    }

    async fn chain_id(&self) -> RelayResult<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        quantity_u64(&value, "chain id")
    }

    async fn block_number(&self) -> RelayResult<u64> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        quantity_u64(&value, "block number")
    }

    async fn logs(
        &self,
        address: &Address,
        topic: &[u8; 32],
        from_block: u64,
    ) -> RelayResult<Vec<EventLog>> {
        let params = json!([{
            "address": address.to_checksum(None),
            "topics": [to_hex_prefixed(topic)],
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": "latest",
        }]);
        let value = self.request("eth_getLogs", params).await?;
        serde_json::from_value(value).map_err(|err| RelayError::Json(err.to_string()))
    }
}

/// `request` on the EVM RPC canister, paying cycles per call.
pub struct EvmRpcCanister {
    canister: Principal,
    service: RpcService,
}

impl EvmRpcCanister {
    pub fn new(canister: Principal, service: RpcService) -> Self {
        Self { canister, service }
    }

    /// A custom provider when `rpc_url` is set, otherwise the canister's own
    /// providers for the configured chain.
    pub fn from_config(config: &RelayerConfig) -> RelayResult<Self> {
        let canister = config.rpc_canister.ok_or(RelayError::ConfigurationMissing {
            field: "rpc_canister",
        })?;
        let service = match config.rpc_url.clone() {
            Some(url) => RpcService::Custom(RpcApi { url, headers: None }),
            None => RpcService::Chain(config.chain_id),
        };
        Ok(Self::new(canister, service))
    }
}

impl EvmRpc for EvmRpcCanister {
    async fn request(&self, method: &'static str, params: Value) -> RelayResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": next_json_rpc_id(),
            "method": method,
            "params": params,
        });
        let payload_str =
            serde_json::to_string(&payload).map_err(|err| RelayError::Json(err.to_string()))?;
        let max_response = if method == "eth_getLogs" {
            LOGS_RESPONSE_ESTIMATE
        } else {
            RPC_RESPONSE_ESTIMATE
        };

        let (response,): (Result<String, RpcCanisterError>,) = call_with_payment128(
            self.canister,
            "request",
            (self.service.clone(), payload_str, max_response),
            RPC_CALL_CYCLES,
        )
        .await
        .map_err(|(code, message)| RelayError::RpcTransport {
            code: format!("{:?}", code),
            message,
        })?;

        let body = response.map_err(|err| RelayError::Rpc {
            code: err.code,
            message: err.message,
            data: None,
        })?;
        let value: Value =
            serde_json::from_str(&body).map_err(|err| RelayError::Json(err.to_string()))?;
        json_rpc_result(value)
    }
}

/// Keeps the error `data`, which carries revert bytes.
pub fn json_rpc_result(value: Value) -> RelayResult<Value> {
    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32_000);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let data = error.get("data").and_then(Value::as_str).map(str::to_string);
        return Err(RelayError::Rpc {
            code,
            message,
            data,
        });
    }
    value
        .get("result")
        .cloned()
        .ok_or(RelayError::RpcResultTypeMismatch { expected: "result" })
}

/// Hex quantity as JSON-RPC returns it: `0x`-prefixed, no leading zeros,
/// possibly an odd number of digits. `0x` alone is zero.
pub fn parse_quantity(value: &str) -> RelayResult<BigUint> {
    let trimmed = value.trim();
    let invalid = || ForwarderError::InvalidHex(trimmed.to_string());
    let digits = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.is_empty() {
        return Ok(BigUint::zero());
    }
    Ok(BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(invalid)?)
}

pub fn to_quantity(value: &BigUint) -> String {
    format!("0x{:x}", value)
}

fn quantity_u64(value: &Value, expected: &'static str) -> RelayResult<u64> {
    parse_quantity(expect_str(value, expected)?)?
        .to_u64()
        .ok_or(RelayError::NumberOutOfRange { field: expected })
}

fn expect_str<'a>(value: &'a Value, expected: &'static str) -> RelayResult<&'a str> {
    value
        .as_str()
        .ok_or(RelayError::RpcResultTypeMismatch { expected })
}

fn next_json_rpc_id() -> u64 {
    JSON_RPC_ID.fetch_add(1, Ordering::Relaxed)
}
