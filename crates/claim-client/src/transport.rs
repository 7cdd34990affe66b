use forwarder::relay::{RelayClaimRequest, RelayFailure};
use forwarder::status::UserStatus;
use forwarder::{Address, U256};
use serde_json::Value;

use crate::error::{ClaimError, Result};

/// Read access to chain state. Every call reflects the chain at call time;
/// implementations must not cache nonces.
#[allow(async_fn_in_trait)]
pub trait ChainReader {
    async fn forwarder_nonce(&self, forwarder: &Address, owner: &Address) -> Result<U256>;

    async fn user_status(&self, user: &Address) -> Result<UserStatus>;

    /// Resolves once the transaction is mined. Dropping the future only
    /// stops waiting; the transaction is unaffected.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
}

/// Posts a signed claim to the relay endpoint.
#[allow(async_fn_in_trait)]
pub trait RelayTransport {
    async fn post_claim(&self, body: &RelayClaimRequest) -> Result<RelayReply>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayReply {
    pub status: u16,
    pub body: Value,
}

impl RelayReply {
    pub fn into_tx_hash(self) -> Result<String> {
        if (200..300).contains(&self.status) {
            if let Some(hash) = self.body.get("txHash").and_then(Value::as_str) {
                return Ok(hash.to_string());
            }
        }
        let status = self.status;
        let message = match serde_json::from_value::<RelayFailure>(self.body) {
            Ok(RelayFailure { error, debug: Some(debug) }) => {
                format!("{} {}", error, debug.summary())
            }
            Ok(RelayFailure { error, debug: None }) => error,
            Err(_) => "relay could not submit the transaction".to_string(),
        };
        Err(ClaimError::Relay { status, message })
    }
}
