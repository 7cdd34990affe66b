//! In-memory doubles for the wallet, chain and relay traits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use forwarder::relay::RelayClaimRequest;
use forwarder::status::{AgeBucket, TokenBalance, UserStatus};
use forwarder::{Address, Signature, TypedForwardRequest, U256};
use k256::ecdsa::SigningKey;
use serde_json::json;

use crate::error::Result;
use crate::transport::{ChainReader, RelayReply, RelayTransport, TransactionReceipt};
use crate::wallet::{LocalWallet, Wallet};

pub struct FakeChain {
    nonce: RefCell<U256>,
    nonce_reads: Cell<usize>,
    verified: Cell<bool>,
    status_reads: Cell<usize>,
    receipt_success: Cell<bool>,
}

impl FakeChain {
    pub fn with_nonce(nonce: u64) -> Self {
        Self {
            nonce: RefCell::new(U256::from(nonce)),
            nonce_reads: Cell::new(0),
            verified: Cell::new(true),
            status_reads: Cell::new(0),
            receipt_success: Cell::new(true),
        }
    }

    pub fn set_nonce(&self, nonce: u64) {
        *self.nonce.borrow_mut() = U256::from(nonce);
    }

    pub fn set_verified(&self, verified: bool) {
        self.verified.set(verified);
    }

    pub fn set_receipt_success(&self, success: bool) {
        self.receipt_success.set(success);
    }

    pub fn nonce_reads(&self) -> usize {
        self.nonce_reads.get()
    }

    pub fn status_reads(&self) -> usize {
        self.status_reads.get()
    }
}

impl ChainReader for FakeChain {
    async fn forwarder_nonce(&self, _forwarder: &Address, _owner: &Address) -> Result<U256> {
        self.nonce_reads.set(self.nonce_reads.get() + 1);
        Ok(*self.nonce.borrow())
    }

    async fn user_status(&self, _user: &Address) -> Result<UserStatus> {
        self.status_reads.set(self.status_reads.get() + 1);
        let verified = self.verified.get();
        Ok(UserStatus {
            verified,
            over18: verified,
            over65: false,
            age_bucket: AgeBucket::from_flags(verified, false),
            token_balance: TokenBalance::NotConfigured,
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        Ok(TransactionReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 1,
            success: self.receipt_success.get(),
        })
    }
}

pub struct FakeRelay {
    replies: RefCell<VecDeque<RelayReply>>,
    posted: RefCell<Vec<RelayClaimRequest>>,
}

impl FakeRelay {
    pub fn accepting() -> Self {
        Self {
            replies: RefCell::new(VecDeque::new()),
            posted: RefCell::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, status: u16, body: serde_json::Value) {
        self.replies
            .borrow_mut()
            .push_back(RelayReply { status, body });
    }

    pub fn posted(&self) -> Vec<RelayClaimRequest> {
        self.posted.borrow().clone()
    }
}

impl RelayTransport for FakeRelay {
    async fn post_claim(&self, body: &RelayClaimRequest) -> Result<RelayReply> {
        self.posted.borrow_mut().push(body.clone());
        let reply = self.replies.borrow_mut().pop_front();
        Ok(reply.unwrap_or_else(|| RelayReply {
            status: 200,
            body: json!({ "txHash": format!("0x{:064x}", self.posted.borrow().len()) }),
        }))
    }
}

/// Reports one account but signs with a different key.
pub struct SwappedKeyWallet {
    claimed: LocalWallet,
    actual: SigningKey,
}

impl SwappedKeyWallet {
    pub fn new() -> Self {
        Self {
            claimed: LocalWallet::from_slice(&[0x11; 32], forwarder::DEFAULT_CHAIN_ID).unwrap(),
            actual: SigningKey::from_slice(&[0x22; 32]).unwrap(),
        }
    }

    pub fn claimed_address(&self) -> Address {
        self.claimed.address()
    }
}

impl Wallet for SwappedKeyWallet {
    async fn chain_id(&self) -> Result<u64> {
        self.claimed.chain_id().await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.claimed.switch_chain(chain_id).await
    }

    async fn account(&self) -> Result<Address> {
        self.claimed.account().await
    }

    async fn sign_typed_data(
        &self,
        _account: &Address,
        typed: &TypedForwardRequest,
    ) -> Result<Signature> {
        Ok(Signature::sign_prehash(&self.actual, &typed.signing_hash())?)
    }
}

/// Ignores network switch requests.
pub struct StuckNetworkWallet {
    inner: LocalWallet,
    chain_id: u64,
}

impl StuckNetworkWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            inner: LocalWallet::from_slice(&[0x11; 32], chain_id).unwrap(),
            chain_id,
        }
    }
}

impl Wallet for StuckNetworkWallet {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn switch_chain(&self, _chain_id: u64) -> Result<()> {
        Ok(())
    }

    async fn account(&self) -> Result<Address> {
        self.inner.account().await
    }

    async fn sign_typed_data(
        &self,
        account: &Address,
        typed: &TypedForwardRequest,
    ) -> Result<Signature> {
        self.inner.sign_typed_data(account, typed).await
    }
}

/// Yields to the executor before signing, leaving the claim in flight.
pub struct SlowWallet {
    inner: LocalWallet,
}

impl SlowWallet {
    pub fn new() -> Self {
        Self {
            inner: LocalWallet::from_slice(&[0x11; 32], forwarder::DEFAULT_CHAIN_ID).unwrap(),
        }
    }
}

impl Wallet for SlowWallet {
    async fn chain_id(&self) -> Result<u64> {
        self.inner.chain_id().await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.inner.switch_chain(chain_id).await
    }

    async fn account(&self) -> Result<Address> {
        self.inner.account().await
    }

    async fn sign_typed_data(
        &self,
        account: &Address,
        typed: &TypedForwardRequest,
    ) -> Result<Signature> {
        tokio::task::yield_now().await;
        self.inner.sign_typed_data(account, typed).await
    }
}
