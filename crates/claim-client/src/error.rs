use forwarder::{Address, ForwarderError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClaimError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("no wallet connected")]
    NoWallet,

    #[error("only verified users can claim")]
    NotVerified,

    #[error("a claim is already in progress")]
    AlreadyClaiming,

    #[error("wallet is on chain {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("invalid signature for active signer. signer={signer} recovered={recovered}")]
    SignerMismatch { signer: Address, recovered: Address },

    #[error("chain read failed: {0}")]
    Chain(String),

    #[error("{message}")]
    Relay { status: u16, message: String },

    #[error("claim transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}
