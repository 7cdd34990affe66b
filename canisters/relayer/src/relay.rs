use forwarder::relay::RelaySuccess;

use crate::error::RelayResult;
use crate::evm::{EvmRpc, EvmRpcCanister};
use crate::signer::{ThresholdEcdsaSigner, TransactionSigner};
use crate::state::{RelayContext, RelayerConfig};
use crate::submitter::RelaySubmitter;
use crate::validator::{ClaimPayload, RelayValidator};

/// `POST /api/claim/relay`. Configuration is resolved before the body is
/// looked at, so a misconfigured relay answers 500 to every request.
pub async fn relay_from_config(
    config: &RelayerConfig,
    body: &[u8],
    now: u64,
) -> RelayResult<RelaySuccess> {
    let ctx = config.relay_context()?;
    let rpc = EvmRpcCanister::from_config(config)?;
    let signer = ThresholdEcdsaSigner::from_context(&ctx);
    relay_claim(&ctx, &rpc, &signer, body, now).await
}

pub async fn relay_claim<R: EvmRpc, S: TransactionSigner>(
    ctx: &RelayContext,
    rpc: &R,
    signer: &S,
    body: &[u8],
    now: u64,
) -> RelayResult<RelaySuccess> {
    let claim = ClaimPayload::from_json(body)?;
    let request = RelayValidator::new(rpc, ctx).validate(&claim, now).await?;
    let tx_hash = RelaySubmitter::new(rpc, signer, ctx).submit(&request).await?;
    Ok(RelaySuccess { tx_hash })
}
