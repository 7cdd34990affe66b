use forwarder::contracts::{decode_bool, decode_uint, nonces_calldata, verify_calldata};
use forwarder::relay::{RelayClaimRequest, VerificationDebug};
use forwarder::{parse_address, Address, Deadline, ForwardRequestData, Signature, U256};

use crate::error::{RelayError, RelayResult};
use crate::evm::EvmRpc;
use crate::log;
use crate::state::RelayContext;

/// Well formed, not yet trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimPayload {
    pub from: Address,
    pub nonce: U256,
    pub gas: U256,
    pub deadline: Deadline,
    pub signature: Signature,
}

impl ClaimPayload {
    pub fn from_json(body: &[u8]) -> RelayResult<Self> {
        let request: RelayClaimRequest =
            serde_json::from_slice(body).map_err(|_| RelayError::IncompletePayload)?;
        Self::parse(&request)
    }

    pub fn parse(request: &RelayClaimRequest) -> RelayResult<Self> {
        let (Some(from), Some(nonce), Some(gas), Some(deadline), Some(signature)) = (
            non_empty(&request.from),
            non_empty(&request.nonce),
            non_empty(&request.gas),
            non_empty(&request.deadline),
            non_empty(&request.signature),
        ) else {
            return Err(RelayError::IncompletePayload);
        };

        Ok(Self {
            from: parse_address(from).map_err(invalid("from"))?,
            nonce: parse_decimal("nonce", nonce)?,
            gas: parse_decimal("gas", gas)?,
            deadline: Deadline::from_decimal(deadline).map_err(invalid("deadline"))?,
            signature: Signature::from_hex(signature).map_err(invalid("signature"))?,
        })
    }
}

/// The declared nonce must equal the on-chain one before `verify` is asked.
pub struct RelayValidator<'a, R> {
    rpc: &'a R,
    ctx: &'a RelayContext,
}

impl<'a, R: EvmRpc> RelayValidator<'a, R> {
    pub fn new(rpc: &'a R, ctx: &'a RelayContext) -> Self {
        Self { rpc, ctx }
    }

    pub async fn validate(&self, claim: &ClaimPayload, now: u64) -> RelayResult<ForwardRequestData> {
        let current = self.current_nonce(&claim.from).await?;
        if current != claim.nonce {
            log!(
                "relay rejected: nonce mismatch from={} expected={} got={}",
                claim.from,
                current,
                claim.nonce
            );
            return Err(RelayError::NonceConflict {
                expected: current,
                got: claim.nonce,
            });
        }

        let typed = self.ctx.request_builder().claim(
            claim.from,
            self.ctx.claim,
            claim.gas,
            claim.deadline,
            claim.nonce,
        );
        let request = typed.message.with_signature(claim.signature);

        let verdict = self
            .rpc
            .call(&self.ctx.forwarder, &verify_calldata(&request))
            .await?;
        if decode_bool(&verdict)? {
            log!("forwarder verified request from={} nonce={}", claim.from, claim.nonce);
            return Ok(request);
        }

        let recovered = typed.recover_signer(&claim.signature).ok();
        log!(
            "relay rejected: verify false from={} recovered={}",
            claim.from,
            recovered
                .map(|a| a.to_checksum(None))
                .unwrap_or_else(|| "none".to_string())
        );
        Err(RelayError::SignatureInvalid {
            debug: Box::new(VerificationDebug {
                expected_from: claim.from.to_checksum(None),
                recovered_signer: recovered.map(|a| a.to_checksum(None)),
                nonce: claim.nonce.to_string(),
                current_nonce: current.to_string(),
                deadline: claim.deadline.as_secs().to_string(),
                now: now.to_string(),
                forwarder: self.ctx.forwarder.to_checksum(None),
                claim: self.ctx.claim.to_checksum(None),
                forwarder_name: self.ctx.forwarder_name.clone(),
            }),
        })
    }

    async fn current_nonce(&self, owner: &Address) -> RelayResult<U256> {
        let data = self
            .rpc
            .call(&self.ctx.forwarder, &nonces_calldata(owner))
            .await?;
        Ok(decode_uint(&data)?)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_decimal(field: &str, value: &str) -> RelayResult<U256> {
    let not_decimal = || RelayError::InvalidPayload(format!("{} is not a decimal uint256", field));
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_decimal());
    }
    U256::from_str_radix(value, 10).map_err(|_| not_decimal())
}

fn invalid<E: std::fmt::Display>(field: &'static str) -> impl Fn(E) -> RelayError {
    move |err| RelayError::InvalidPayload(format!("{}: {}", field, err))
}
