//! Client side of the gasless claim. Wallet, chain reads and the relay
//! endpoint are traits bound by the embedder.

mod error;
mod flow;
mod producer;
mod transport;
mod wallet;

#[cfg(test)]
mod testing;

pub use error::{ClaimError, Result};
pub use flow::{ClaimFlow, ClaimState, CLAIM_SUCCEEDED_MESSAGE};
pub use producer::{
    ClaimConfig, PreparedClaim, SignatureProducer, SignedClaim, DEADLINE_WINDOW_SECS,
    DEFAULT_CLAIM_GAS,
};
pub use transport::{ChainReader, RelayReply, RelayTransport, TransactionReceipt};
pub use wallet::{LocalWallet, Wallet};
