use std::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

use forwarder::status::UserStatus;
use tracing::{debug, info, warn};

use crate::error::{ClaimError, Result};
use crate::producer::{ClaimConfig, SignatureProducer};
use crate::transport::{ChainReader, RelayTransport};
use crate::wallet::Wallet;

pub const CLAIM_SUCCEEDED_MESSAGE: &str = "Claim executed by the relayer (user paid no gas).";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimState {
    Idle,
    BuildingRequest,
    AwaitingSignature,
    Relaying,
    AwaitingConfirmation { tx_hash: String },
    Succeeded { tx_hash: String },
    Failed { reason: String },
}

impl ClaimState {
    fn is_settled(&self) -> bool {
        matches!(
            self,
            ClaimState::Idle | ClaimState::Succeeded { .. } | ClaimState::Failed { .. }
        )
    }
}

/// Drives one claim at a time from the user's wallet to a mined relay
/// transaction. Nothing survives between attempts except the last status
/// snapshot and message; each attempt re-reads the forwarder nonce.
pub struct ClaimFlow<W, C, R> {
    wallet: W,
    chain: C,
    relay: R,
    config: ClaimConfig,
    state: RefCell<ClaimState>,
    claiming: Cell<bool>,
    status: RefCell<Option<UserStatus>>,
    message: RefCell<Option<String>>,
}

/// Clears the in-flight flag when an attempt ends, including when the
/// caller drops the claim future.
struct InFlight<'a> {
    claiming: &'a Cell<bool>,
    state: &'a RefCell<ClaimState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.claiming.set(false);
        let mut state = self.state.borrow_mut();
        if !state.is_settled() {
            *state = ClaimState::Idle;
        }
    }
}

impl<W: Wallet, C: ChainReader, R: RelayTransport> ClaimFlow<W, C, R> {
    pub fn new(wallet: W, chain: C, relay: R, config: ClaimConfig) -> Self {
        Self {
            wallet,
            chain,
            relay,
            config,
            state: RefCell::new(ClaimState::Idle),
            claiming: Cell::new(false),
            status: RefCell::new(None),
            message: RefCell::new(None),
        }
    }

    pub fn state(&self) -> ClaimState {
        self.state.borrow().clone()
    }

    pub fn is_claiming(&self) -> bool {
        self.claiming.get()
    }

    pub fn message(&self) -> Option<String> {
        self.message.borrow().clone()
    }

    pub fn user_status(&self) -> Option<UserStatus> {
        self.status.borrow().clone()
    }

    pub fn can_claim(&self) -> bool {
        !self.claiming.get()
            && self
                .status
                .borrow()
                .as_ref()
                .map(UserStatus::can_claim)
                .unwrap_or(false)
    }

    pub async fn refresh_status(&self) -> Result<UserStatus> {
        let account = self.wallet.account().await?;
        match self.chain.user_status(&account).await {
            Ok(status) => {
                *self.status.borrow_mut() = Some(status.clone());
                Ok(status)
            }
            Err(err) => {
                *self.status.borrow_mut() = None;
                Err(err)
            }
        }
    }

    pub async fn claim(&self) -> Result<String> {
        self.claim_at(unix_now()).await
    }

    pub async fn claim_at(&self, now: u64) -> Result<String> {
        if self.claiming.get() {
            return Err(ClaimError::AlreadyClaiming);
        }
        let verified = self
            .status
            .borrow()
            .as_ref()
            .map(UserStatus::can_claim)
            .unwrap_or(false);
        if !verified {
            let err = ClaimError::NotVerified;
            *self.message.borrow_mut() = Some(err.to_string());
            return Err(err);
        }

        self.claiming.set(true);
        let _in_flight = InFlight {
            claiming: &self.claiming,
            state: &self.state,
        };
        *self.message.borrow_mut() = None;
        self.transition(ClaimState::Idle);

        match self.run(now).await {
            Ok(tx_hash) => {
                info!(%tx_hash, "claim confirmed");
                self.transition(ClaimState::Succeeded {
                    tx_hash: tx_hash.clone(),
                });
                *self.message.borrow_mut() = Some(CLAIM_SUCCEEDED_MESSAGE.to_string());
                if let Err(err) = self.refresh_status().await {
                    warn!(error = %err, "status refresh after claim failed");
                }
                Ok(tx_hash)
            }
            Err(err) => {
                warn!(error = %err, "claim failed");
                let reason = err.to_string();
                self.transition(ClaimState::Failed {
                    reason: reason.clone(),
                });
                *self.message.borrow_mut() = Some(reason);
                Err(err)
            }
        }
    }

    async fn run(&self, now: u64) -> Result<String> {
        let producer = SignatureProducer::new(&self.wallet, &self.chain, &self.config);

        self.transition(ClaimState::BuildingRequest);
        let prepared = producer.prepare(now).await?;

        self.transition(ClaimState::AwaitingSignature);
        let signed = producer.sign(prepared).await?;

        self.transition(ClaimState::Relaying);
        let tx_hash = self
            .relay
            .post_claim(&signed.relay_body())
            .await?
            .into_tx_hash()?;

        self.transition(ClaimState::AwaitingConfirmation {
            tx_hash: tx_hash.clone(),
        });
        let receipt = self.chain.wait_for_receipt(&tx_hash).await?;
        if !receipt.success {
            return Err(ClaimError::Reverted { tx_hash });
        }
        Ok(tx_hash)
    }

    fn transition(&self, next: ClaimState) {
        debug!(state = ?next, "claim state");
        *self.state.borrow_mut() = next;
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
