//! JSON bodies exchanged with the relay endpoint.

use serde::{Deserialize, Serialize};

pub const RELAY_PATH: &str = "/api/claim/relay";

/// Request body. Every field is optional on the wire so that a missing
/// field is reported as an invalid payload instead of a decode failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayClaimRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySuccess {
    pub tx_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<VerificationDebug>,
}

/// Diagnostics returned when the forwarder rejects a signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDebug {
    pub expected_from: String,
    pub recovered_signer: Option<String>,
    pub nonce: String,
    pub current_nonce: String,
    pub deadline: String,
    pub now: String,
    pub forwarder: String,
    pub claim: String,
    pub forwarder_name: String,
}

impl VerificationDebug {
    pub fn summary(&self) -> String {
        format!(
            "expectedFrom={} recoveredSigner={} nonce={}/{} deadline={} now={}",
            self.expected_from,
            self.recovered_signer.as_deref().unwrap_or("none"),
            self.nonce,
            self.current_nonce,
            self.deadline,
            self.now
        )
    }
}
