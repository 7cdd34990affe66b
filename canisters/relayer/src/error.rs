use forwarder::relay::{RelayFailure, VerificationDebug};
use forwarder::{ForwarderError, U256};
use num_bigint::BigUint;
use thiserror::Error;

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Clone, Debug, Error)]
pub enum RelayError {
    #[error("not authorized")]
    NotAuthorized,

    #[error("Missing {field}")]
    ConfigurationMissing { field: &'static str },

    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    #[error("Invalid relay payload")]
    IncompletePayload,

    #[error("Invalid relay payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    InvalidQuery(String),

    #[error("Invalid nonce. expected={expected} got={got}")]
    NonceConflict { expected: U256, got: U256 },

    #[error("Forwarder.verify returned false")]
    SignatureInvalid { debug: Box<VerificationDebug> },

    #[error("{0}")]
    ExecutionReverted(String),

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("rpc transport error {code}: {message}")]
    RpcTransport { code: String, message: String },

    #[error("unexpected rpc result type, expected {expected}")]
    RpcResultTypeMismatch { expected: &'static str },

    #[error("threshold signing failed: {0}")]
    Signing(String),

    #[error("gas balance low: required {required}, actual {actual}")]
    GasBalanceLow { required: BigUint, actual: BigUint },

    #[error("number out of range: {field}")]
    NumberOutOfRange { field: &'static str },

    #[error("json error: {0}")]
    Json(String),

    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}

impl RelayError {
    /// HTTP status the relay endpoint answers with. Caller mistakes are 4xx;
    /// everything the relay or the chain did wrong is 500.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::IncompletePayload
            | RelayError::InvalidPayload(_)
            | RelayError::InvalidQuery(_)
            | RelayError::SignatureInvalid { .. } => 400,
            RelayError::NotAuthorized => 403,
            RelayError::NonceConflict { .. } => 409,
            _ => 500,
        }
    }

    pub fn to_failure(&self) -> RelayFailure {
        let debug = match self {
            RelayError::SignatureInvalid { debug } => Some(debug.as_ref().clone()),
            _ => None,
        };
        RelayFailure {
            error: self.to_string(),
            debug,
        }
    }
}
