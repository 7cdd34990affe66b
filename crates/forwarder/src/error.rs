use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForwarderError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwarderError {
    #[error("invalid address {value}: {reason}")]
    InvalidAddress { value: String, reason: &'static str },

    #[error("address checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("failed to decode hex: {0}")]
    InvalidHex(String),

    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} does not fit in {bits} bits")]
    OutOfRange { field: &'static str, bits: u32 },

    #[error("invalid decimal number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid signature recovery byte {0}")]
    InvalidRecoveryId(u8),

    #[error("signature recovery failed: {0}")]
    Recovery(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("abi: {0}")]
    Abi(String),
}

impl From<alloy_sol_types::Error> for ForwarderError {
    fn from(err: alloy_sol_types::Error) -> Self {
        ForwarderError::Abi(err.to_string())
    }
}
