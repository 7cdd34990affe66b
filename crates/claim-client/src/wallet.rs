use std::cell::Cell;

use forwarder::{address_of, Address, Signature, TypedForwardRequest};
use k256::ecdsa::SigningKey;

use crate::error::{ClaimError, Result};

/// The user's wallet as seen by the claim flow: network selection, the
/// active account, and `eth_signTypedData_v4`.
#[allow(async_fn_in_trait)]
pub trait Wallet {
    async fn chain_id(&self) -> Result<u64>;

    async fn switch_chain(&self, chain_id: u64) -> Result<()>;

    async fn account(&self) -> Result<Address>;

    async fn sign_typed_data(
        &self,
        account: &Address,
        typed: &TypedForwardRequest,
    ) -> Result<Signature>;
}

/// A wallet backed by an in-process secp256k1 key.
pub struct LocalWallet {
    key: SigningKey,
    address: Address,
    chain_id: Cell<u64>,
}

impl LocalWallet {
    pub fn new(key: SigningKey, chain_id: u64) -> Self {
        let address = address_of(key.verifying_key());
        Self {
            key,
            address,
            chain_id: Cell::new(chain_id),
        }
    }

    pub fn from_slice(secret: &[u8], chain_id: u64) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|e| ClaimError::Wallet(e.to_string()))?;
        Ok(Self::new(key, chain_id))
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl Wallet for LocalWallet {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id.get())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.chain_id.set(chain_id);
        Ok(())
    }

    async fn account(&self) -> Result<Address> {
        Ok(self.address)
    }

    async fn sign_typed_data(
        &self,
        account: &Address,
        typed: &TypedForwardRequest,
    ) -> Result<Signature> {
        if *account != self.address {
            return Err(ClaimError::Wallet(format!(
                "account {} is not managed by this wallet",
                account
            )));
        }
        Ok(Signature::sign_prehash(&self.key, &typed.signing_hash())?)
    }
}
