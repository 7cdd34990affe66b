use forwarder::{address_of, Address, Signature};
use ic_cdk::api::management_canister::ecdsa::{
    ecdsa_public_key, sign_with_ecdsa, EcdsaCurve, EcdsaKeyId, EcdsaPublicKeyArgument,
    EcdsaPublicKeyResponse, SignWithEcdsaArgument, SignWithEcdsaResponse,
};
use k256::ecdsa::VerifyingKey;

use crate::error::{RelayError, RelayResult};
use crate::state::RelayContext;

/// Signs relayer transactions. The returned signature carries the y-parity
/// (0 or 1) in `v`.
#[allow(async_fn_in_trait)]
pub trait TransactionSigner {
    fn address(&self) -> Address;

    async fn sign_digest(&self, digest: &[u8; 32]) -> RelayResult<Signature>;
}

/// The subnet's threshold-ECDSA key. Only `r || s` comes back from the
/// management canister, so the parity is found by recovering against the
/// known relayer address.
pub struct ThresholdEcdsaSigner {
    key_name: String,
    derivation_path: Vec<Vec<u8>>,
    address: Address,
}

impl ThresholdEcdsaSigner {
    pub fn from_context(ctx: &RelayContext) -> Self {
        Self {
            key_name: ctx.key_name.clone(),
            derivation_path: ctx.derivation_path.clone(),
            address: ctx.relayer,
        }
    }
}

impl TransactionSigner for ThresholdEcdsaSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: &[u8; 32]) -> RelayResult<Signature> {
        let arg = SignWithEcdsaArgument {
            message_hash: digest.to_vec(),
            derivation_path: self.derivation_path.clone(),
            key_id: key_id(&self.key_name),
        };
        let (SignWithEcdsaResponse { signature },) =
            sign_with_ecdsa(arg)
                .await
                .map_err(|(code, message)| RelayError::RpcTransport {
                    code: format!("{:?}", code),
                    message,
                })?;
        with_recovered_parity(digest, &signature, &self.address)
    }
}

pub async fn derive_address(key_name: &str, derivation_path: &[Vec<u8>]) -> RelayResult<Address> {
    let arg = EcdsaPublicKeyArgument {
        canister_id: None,
        derivation_path: derivation_path.to_vec(),
        key_id: key_id(key_name),
    };
    let (EcdsaPublicKeyResponse { public_key, .. },) = ecdsa_public_key(arg)
        .await
        .map_err(|(code, message)| RelayError::RpcTransport {
            code: format!("{:?}", code),
            message,
        })?;
    let key = VerifyingKey::from_sec1_bytes(&public_key)
        .map_err(|err| RelayError::Signing(err.to_string()))?;
    Ok(address_of(&key))
}

/// Turns a 64-byte `r || s` into a full signature by picking the parity
/// whose recovered address is `expected`.
pub fn with_recovered_parity(
    digest: &[u8; 32],
    compact: &[u8],
    expected: &Address,
) -> RelayResult<Signature> {
    if compact.len() != 64 {
        return Err(RelayError::Signing(format!(
            "expected 64-byte signature, got {}",
            compact.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&compact[..32]);
    s.copy_from_slice(&compact[32..]);
    for parity in 0..=1u8 {
        let candidate = Signature::from_parts(r, s, parity);
        if candidate.recover(digest).ok().as_ref() == Some(expected) {
            return Ok(candidate);
        }
    }
    Err(RelayError::Signing(format!(
        "signature does not recover to relayer {}",
        expected
    )))
}

fn key_id(name: &str) -> EcdsaKeyId {
    EcdsaKeyId {
        curve: EcdsaCurve::Secp256k1,
        name: name.to_string(),
    }
}
