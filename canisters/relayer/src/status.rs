use std::collections::BTreeSet;

use forwarder::contracts::{
    address_flag_calldata, address_verified_topic, balance_of_calldata, decimals_calldata,
    decode_bool, decode_decimals, decode_uint, minting_paused_calldata,
    verification_revoked_topic, VerifierFlag,
};
use forwarder::status::{format_units, AgeBucket, NetworkStatus, TokenBalance, UserStatus};
use forwarder::Address;
use futures::{join, try_join};

use crate::error::{RelayError, RelayResult};
use crate::evm::{EventLog, EvmRpc};
use crate::log;
use crate::state::StatusContext;

/// Read-only views behind the claim gate. Every call goes to the chain.
pub struct StatusReader<'a, R> {
    rpc: &'a R,
    ctx: &'a StatusContext,
}

impl<'a, R: EvmRpc> StatusReader<'a, R> {
    pub fn new(rpc: &'a R, ctx: &'a StatusContext) -> Self {
        Self { rpc, ctx }
    }

    /// Verifier flags fail the whole read; a token balance that cannot be
    /// read degrades to [`TokenBalance::Unavailable`].
    pub async fn user_status(&self, user: &Address) -> RelayResult<UserStatus> {
        let (verified, over18, over65, token_balance) = join!(
            self.flag(VerifierFlag::Verified, user),
            self.flag(VerifierFlag::Over18, user),
            self.flag(VerifierFlag::Over65, user),
            self.token_balance(user),
        );
        let (verified, over18, over65) = (verified?, over18?, over65?);
        Ok(UserStatus {
            verified,
            over18,
            over65,
            age_bucket: AgeBucket::from_flags(over18, over65),
            token_balance,
        })
    }

    pub async fn network_status(&self) -> RelayResult<NetworkStatus> {
        let token = self.ctx.token.ok_or(RelayError::ConfigurationMissing {
            field: "token_address",
        })?;
        let (chain_id, latest_block, minting_paused, verified, revoked) = try_join!(
            self.rpc.chain_id(),
            self.rpc.block_number(),
            self.minting_paused(&token),
            self.events(address_verified_topic()),
            self.events(verification_revoked_topic()),
        )?;
        Ok(NetworkStatus {
            chain_id,
            latest_block,
            minting_paused,
            verified_events: verified.len() as u64,
            revoked_events: revoked.len() as u64,
            unique_verified_wallets: unique_accounts(&verified),
            unique_revoked_wallets: unique_accounts(&revoked),
            from_block: self.ctx.from_block,
        })
    }

    async fn flag(&self, flag: VerifierFlag, user: &Address) -> RelayResult<bool> {
        let data = address_flag_calldata(flag, user);
        Ok(decode_bool(&self.rpc.call(&self.ctx.verifier, &data).await?)?)
    }

    async fn minting_paused(&self, token: &Address) -> RelayResult<bool> {
        let data = self.rpc.call(token, &minting_paused_calldata()).await?;
        Ok(decode_bool(&data)?)
    }

    async fn token_balance(&self, user: &Address) -> TokenBalance {
        let Some(token) = self.ctx.token else {
            return TokenBalance::NotConfigured;
        };
        match self.read_balance(&token, user).await {
            Ok(amount) => TokenBalance::Amount(amount),
            Err(err) => {
                log!("token balance unavailable for {}: {}", user, err);
                TokenBalance::Unavailable
            }
        }
    }

    async fn read_balance(&self, token: &Address, user: &Address) -> RelayResult<String> {
        let balance_call = balance_of_calldata(user);
        let decimals_call = decimals_calldata();
        let (balance, decimals) = try_join!(
            self.rpc.call(token, &balance_call),
            self.rpc.call(token, &decimals_call),
        )?;
        Ok(format_units(&decode_uint(&balance)?, decode_decimals(&decimals)?))
    }

    async fn events(&self, topic0: [u8; 32]) -> RelayResult<Vec<EventLog>> {
        self.rpc
            .logs(&self.ctx.verifier, &topic0, self.ctx.from_block)
            .await
    }
}

/// Distinct indexed accounts (first topic after the event id).
fn unique_accounts(logs: &[EventLog]) -> u64 {
    logs.iter()
        .filter_map(|log| log.topics.get(1))
        .map(|topic| topic.to_lowercase())
        .collect::<BTreeSet<_>>()
        .len() as u64
}
