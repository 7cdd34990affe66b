use forwarder::relay::RelayClaimRequest;
use forwarder::{
    Address, Deadline, ForwardRequestBuilder, ForwarderDomain, Signature, TypedForwardRequest,
    DEFAULT_CHAIN_ID, DEFAULT_FORWARDER_NAME, U256,
};
use tracing::{debug, warn};

use crate::error::{ClaimError, Result};
use crate::transport::ChainReader;
use crate::wallet::Wallet;

pub const DEFAULT_CLAIM_GAS: u64 = 300_000;
pub const DEADLINE_WINDOW_SECS: u64 = 20 * 60;

#[derive(Clone, Debug)]
pub struct ClaimConfig {
    pub chain_id: u64,
    pub forwarder: Address,
    pub forwarder_name: String,
    pub claim: Address,
    pub gas: U256,
    pub deadline_window_secs: u64,
}

impl ClaimConfig {
    pub fn new(forwarder: Address, claim: Address) -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            forwarder,
            forwarder_name: DEFAULT_FORWARDER_NAME.to_string(),
            claim,
            gas: U256::from(DEFAULT_CLAIM_GAS),
            deadline_window_secs: DEADLINE_WINDOW_SECS,
        }
    }

    pub fn request_builder(&self) -> ForwardRequestBuilder {
        ForwardRequestBuilder::new(ForwarderDomain::new(
            self.forwarder_name.clone(),
            self.chain_id,
            self.forwarder,
        ))
    }
}

/// A typed request ready for the wallet prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedClaim {
    pub signer: Address,
    pub typed: TypedForwardRequest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedClaim {
    pub typed: TypedForwardRequest,
    pub signature: Signature,
}

impl SignedClaim {
    pub fn relay_body(&self) -> RelayClaimRequest {
        let message = &self.typed.message;
        RelayClaimRequest {
            from: Some(message.from.to_checksum(None)),
            nonce: Some(message.nonce.to_string()),
            gas: Some(message.gas.to_string()),
            deadline: Some(message.expires_at().as_secs().to_string()),
            signature: Some(self.signature.to_hex()),
        }
    }
}

/// Obtains a typed-data signature from the wallet and checks locally that
/// it recovers to the active account before anything leaves the client.
pub struct SignatureProducer<'a, W, C> {
    wallet: &'a W,
    chain: &'a C,
    config: &'a ClaimConfig,
}

impl<'a, W: Wallet, C: ChainReader> SignatureProducer<'a, W, C> {
    pub fn new(wallet: &'a W, chain: &'a C, config: &'a ClaimConfig) -> Self {
        Self {
            wallet,
            chain,
            config,
        }
    }

    pub async fn produce(&self, now: u64) -> Result<SignedClaim> {
        let prepared = self.prepare(now).await?;
        self.sign(prepared).await
    }

    /// Network check, fresh nonce read and request construction.
    pub async fn prepare(&self, now: u64) -> Result<PreparedClaim> {
        self.ensure_network().await?;
        let signer = self.wallet.account().await?;
        let nonce = self
            .chain
            .forwarder_nonce(&self.config.forwarder, &signer)
            .await?;
        let deadline = Deadline::after(now, self.config.deadline_window_secs);
        debug!(%signer, %nonce, deadline = deadline.as_secs(), "building forward request");

        let typed = self.config.request_builder().claim(
            signer,
            self.config.claim,
            self.config.gas,
            deadline,
            nonce,
        );
        Ok(PreparedClaim { signer, typed })
    }

    pub async fn sign(&self, prepared: PreparedClaim) -> Result<SignedClaim> {
        let PreparedClaim { signer, typed } = prepared;
        let signature = self.wallet.sign_typed_data(&signer, &typed).await?;
        let recovered = typed.recover_signer(&signature)?;
        if recovered != signer {
            warn!(%signer, %recovered, "wallet signature does not recover to the active account");
            return Err(ClaimError::SignerMismatch { signer, recovered });
        }
        Ok(SignedClaim { typed, signature })
    }

    async fn ensure_network(&self) -> Result<()> {
        let expected = self.config.chain_id;
        let actual = self.wallet.chain_id().await?;
        if actual == expected {
            return Ok(());
        }
        debug!(actual, expected, "switching wallet network");
        self.wallet.switch_chain(expected).await?;
        let actual = self.wallet.chain_id().await?;
        if actual != expected {
            return Err(ClaimError::WrongNetwork { expected, actual });
        }
        Ok(())
    }
}
