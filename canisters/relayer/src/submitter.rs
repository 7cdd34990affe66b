use std::cell::RefCell;
use std::collections::BTreeSet;

use forwarder::contracts::{describe_revert, execute_calldata};
use forwarder::{parse_hex_bytes, ForwardRequestData};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::{RelayError, RelayResult};
use crate::evm::EvmRpc;
use crate::log;
use crate::signer::TransactionSigner;
use crate::state::RelayContext;
use crate::transaction::Eip1559Transaction;

const MIN_GAS_LIMIT: u64 = 50_000;
const GAS_LIMIT_MULTIPLIER: f64 = 1.2;
const PRIORITY_FEE_FLOOR_WEI: u64 = 1_000_000_000;

thread_local! {
    static RELAYER_NONCES: RefCell<NonceSequencer> = RefCell::new(NonceSequencer::default());
}

/// Hands out transaction nonces for the relayer account. Update calls
/// interleave at every await, so two submissions can read the same pending
/// count from the chain.
///
/// A reserved nonce stays outstanding until the chain's pending count moves
/// past it. A released nonce is handed out again before `next` advances, so
/// a failed broadcast never leaves a gap that later transactions queue
/// behind. With nothing outstanding the sequencer falls back to the chain's
/// count.
#[derive(Debug, Default)]
pub struct NonceSequencer {
    next: Option<u64>,
    outstanding: BTreeSet<u64>,
    released: BTreeSet<u64>,
}

impl NonceSequencer {
    pub fn reserve(&mut self, chain_pending: u64) -> u64 {
        self.outstanding = self.outstanding.split_off(&chain_pending);
        self.released = self.released.split_off(&chain_pending);
        if self.outstanding.is_empty() {
            self.next = None;
            self.released.clear();
        }

        let nonce = match self.released.pop_first() {
            Some(reused) => reused,
            None => {
                let nonce = self.next.map_or(chain_pending, |next| next.max(chain_pending));
                self.next = Some(nonce + 1);
                nonce
            }
        };
        self.outstanding.insert(nonce);
        nonce
    }

    /// Gives back a nonce whose broadcast failed.
    pub fn release(&mut self, nonce: u64) {
        if self.outstanding.remove(&nonce) {
            self.released.insert(nonce);
        }
    }
}

#[cfg(test)]
pub(crate) fn reset_nonce_sequencer() {
    RELAYER_NONCES.with(|cell| *cell.borrow_mut() = NonceSequencer::default());
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: BigUint,
    pub max_priority_fee_per_gas: BigUint,
}

impl FeeQuote {
    /// `max_fee = base_fee * max_fee_multiplier + priority`, where the
    /// priority tip is scaled by its own multiplier and never zero.
    pub fn from_market(
        base_fee: &BigUint,
        priority_fee: &BigUint,
        max_fee_multiplier: f64,
        priority_multiplier: f64,
    ) -> RelayResult<Self> {
        let mut priority = scale_at_least(priority_fee, priority_multiplier)?;
        if priority.is_zero() {
            priority = BigUint::from(PRIORITY_FEE_FLOOR_WEI);
        }
        let base = scale_at_least(base_fee, max_fee_multiplier)?;
        Ok(Self {
            max_fee_per_gas: base + &priority,
            max_priority_fee_per_gas: priority,
        })
    }
}

/// Estimate floored at 50k and padded by 20%.
pub fn gas_limit_for(estimate: &BigUint) -> RelayResult<BigUint> {
    let floor = BigUint::from(MIN_GAS_LIMIT);
    let padded = if *estimate < floor { &floor } else { estimate };
    scale_at_least(padded, GAS_LIMIT_MULTIPLIER)
}

fn scale_at_least(value: &BigUint, multiplier: f64) -> RelayResult<BigUint> {
    let base = value
        .to_u128()
        .ok_or(RelayError::NumberOutOfRange { field: "u128" })?;
    let scaled = (base as f64 * multiplier).ceil();
    if scaled.is_nan() || scaled.is_infinite() || scaled < 0.0 {
        return Err(RelayError::NumberOutOfRange {
            field: "scaled value",
        });
    }
    let scaled = BigUint::from(scaled as u128);
    Ok(if scaled < *value { value.clone() } else { scaled })
}

/// Returns the transaction hash without waiting for it to be mined.
/// Nothing is retried.
pub struct RelaySubmitter<'a, R, S> {
    rpc: &'a R,
    signer: &'a S,
    ctx: &'a RelayContext,
}

impl<'a, R: EvmRpc, S: TransactionSigner> RelaySubmitter<'a, R, S> {
    pub fn new(rpc: &'a R, signer: &'a S, ctx: &'a RelayContext) -> Self {
        Self { rpc, signer, ctx }
    }

    pub async fn submit(&self, request: &ForwardRequestData) -> RelayResult<String> {
        let relayer = self.signer.address();
        let call_data = execute_calldata(request);

        let estimate = self
            .rpc
            .estimate_gas(&relayer, &self.ctx.forwarder, &call_data)
            .await
            .map_err(as_execution_revert)?;
        let gas_limit = gas_limit_for(&estimate)?;

        let base_fee = self.rpc.base_fee().await?;
        let priority_fee = self.rpc.max_priority_fee().await?;
        let fees = FeeQuote::from_market(
            &base_fee,
            &priority_fee,
            self.ctx.max_fee_multiplier,
            self.ctx.priority_multiplier,
        )?;

        let balance = self.rpc.balance(&relayer).await?;
        let worst_case = &gas_limit * &fees.max_fee_per_gas;
        let required = if worst_case > self.ctx.threshold_wei {
            worst_case
        } else {
            self.ctx.threshold_wei.clone()
        };
        if balance < required {
            log!("relayer {} underfunded: balance={} required={}", relayer, balance, required);
            return Err(RelayError::GasBalanceLow {
                required,
                actual: balance,
            });
        }

        let pending = self.rpc.pending_transaction_count(&relayer).await?;
        let nonce = RELAYER_NONCES.with(|cell| cell.borrow_mut().reserve(pending));
        log!("relayer nonce reserved: {} (chain pending {})", nonce, pending);

        let tx = Eip1559Transaction {
            chain_id: self.ctx.chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            to: self.ctx.forwarder,
            value: BigUint::zero(),
            data: call_data,
        };

        match self.sign_and_send(&tx).await {
            Ok(tx_hash) => {
                log!("relayed request from={} tx={}", request.from, tx_hash);
                Ok(tx_hash)
            }
            Err(err) => {
                RELAYER_NONCES.with(|cell| cell.borrow_mut().release(nonce));
                log!("relay broadcast failed nonce={}: {}", nonce, err);
                Err(err)
            }
        }
    }

    async fn sign_and_send(&self, tx: &Eip1559Transaction) -> RelayResult<String> {
        let signature = self.signer.sign_digest(&tx.signing_hash()).await?;
        let raw = tx.encode_signed(&signature)?;
        self.rpc.send_raw_transaction(&raw).await
    }
}

fn as_execution_revert(err: RelayError) -> RelayError {
    match err {
        RelayError::Rpc { message, data, .. } => {
            let decoded = data
                .as_deref()
                .and_then(|d| parse_hex_bytes(d).ok())
                .filter(|bytes| !bytes.is_empty())
                .map(|bytes| describe_revert(&bytes));
            RelayError::ExecutionReverted(decoded.unwrap_or(message))
        }
        other => other,
    }
}
