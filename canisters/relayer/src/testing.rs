//! In-memory chain and signer for relay tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use alloy_sol_types::{SolCall, SolError, SolValue};
use forwarder::contracts::{
    address_verified_topic, decode_execute, verification_revoked_topic, IAgeVerifier,
    IForwarder, IRewardToken,
};
use forwarder::relay::RelayClaimRequest;
use forwarder::status::DEFAULT_FROM_BLOCK;
use forwarder::{
    address_of, keccak256, parse_address, parse_hex_bytes, to_hex_prefixed, Address, Deadline,
    ForwardRequestBuilder, ForwardRequestData, Signature, DEFAULT_CHAIN_ID,
    DEFAULT_FORWARDER_NAME, U256,
};
use k256::ecdsa::SigningKey;
use num_bigint::BigUint;
use num_traits::Zero;
use serde_json::{json, Value};

use crate::error::{RelayError, RelayResult};
use crate::evm::{to_quantity, EvmRpc};
use crate::signer::TransactionSigner;
use crate::state::{RelayContext, StatusContext};
use crate::submitter::reset_nonce_sequencer;
use crate::transaction::{rlp_encode_bytes, rlp_encode_list};

pub const NOW: u64 = 1_700_000_000;
const VERIFIER: Address = Address::new([0xee; 20]);
const TOKEN: Address = Address::new([0xdd; 20]);
const LATEST_BLOCK: u64 = 10_500_000;
const GAS_ESTIMATE: u64 = 80_000;

pub fn user_key() -> SigningKey {
    SigningKey::from_slice(&[0x11; 32]).unwrap()
}

fn relayer_key() -> SigningKey {
    SigningKey::from_slice(&[0x22; 32]).unwrap()
}

pub fn claim_context() -> RelayContext {
    RelayContext {
        chain_id: DEFAULT_CHAIN_ID,
        forwarder: Address::new([0xf0; 20]),
        forwarder_name: DEFAULT_FORWARDER_NAME.to_string(),
        claim: Address::new([0xcc; 20]),
        relayer: LocalSigner::relayer().address(),
        key_name: "test_key_1".to_string(),
        derivation_path: Vec::new(),
        threshold_wei: BigUint::zero(),
        max_fee_multiplier: 2.0,
        priority_multiplier: 1.2,
    }
}

pub fn status_context() -> StatusContext {
    StatusContext {
        verifier: VERIFIER,
        token: Some(TOKEN),
        from_block: DEFAULT_FROM_BLOCK,
    }
}

/// What a wallet would post for a claim signed by `key`.
pub fn sign_claim(
    key: &SigningKey,
    ctx: &RelayContext,
    nonce: u64,
    deadline: u64,
) -> RelayClaimRequest {
    let from = address_of(key.verifying_key());
    let typed = ctx.request_builder().claim(
        from,
        ctx.claim,
        U256::from(300_000u32),
        Deadline::new(deadline).unwrap(),
        U256::from(nonce),
    );
    let signature = Signature::sign_prehash(key, &typed.signing_hash()).unwrap();
    RelayClaimRequest {
        from: Some(from.to_checksum(None)),
        nonce: Some(nonce.to_string()),
        gas: Some("300000".to_string()),
        deadline: Some(deadline.to_string()),
        signature: Some(signature.to_hex()),
    }
}

pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn relayer() -> Self {
        let key = relayer_key();
        let address = address_of(key.verifying_key());
        Self { key, address }
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: &[u8; 32]) -> RelayResult<Signature> {
        Ok(Signature::sign_prehash(&self.key, digest)?)
    }
}

#[derive(Clone, Debug)]
pub struct SentTx {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub data: Vec<u8>,
}

/// Forwarder, verifier and token contracts in memory. `verify` checks the
/// signature against the stored nonce; `execute` (seen through gas
/// estimation and broadcast) also enforces the deadline and bumps the
/// signer's nonce once the transaction is sent.
pub struct MockChain {
    builder: ForwardRequestBuilder,
    forwarder: Address,
    claim: Address,
    nonces: RefCell<HashMap<Address, u64>>,
    relayer_balance: RefCell<BigUint>,
    pending: Cell<u64>,
    pending_frozen: Cell<bool>,
    send_failures: RefCell<Vec<String>>,
    sent: RefCell<Vec<SentTx>>,
    rpc_calls: Cell<usize>,
    verify_calls: Cell<usize>,
    estimate_calls: Cell<usize>,
    flags: RefCell<HashMap<Address, [bool; 3]>>,
    token_balances: RefCell<HashMap<Address, U256>>,
    token_broken: Cell<bool>,
    verifier_broken: Cell<bool>,
    minting_paused: Cell<bool>,
    verified_logs: RefCell<Vec<Address>>,
    revoked_logs: RefCell<Vec<Address>>,
    last_log_from_block: RefCell<Option<String>>,
}

impl MockChain {
    pub fn new(ctx: &RelayContext) -> Self {
        reset_nonce_sequencer();
        Self {
            builder: ctx.request_builder(),
            forwarder: ctx.forwarder,
            claim: ctx.claim,
            nonces: RefCell::new(HashMap::new()),
            relayer_balance: RefCell::new(BigUint::from(10u64).pow(18)),
            pending: Cell::new(0),
            pending_frozen: Cell::new(false),
            send_failures: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            rpc_calls: Cell::new(0),
            verify_calls: Cell::new(0),
            estimate_calls: Cell::new(0),
            flags: RefCell::new(HashMap::new()),
            token_balances: RefCell::new(HashMap::new()),
            token_broken: Cell::new(false),
            verifier_broken: Cell::new(false),
            minting_paused: Cell::new(false),
            verified_logs: RefCell::new(Vec::new()),
            revoked_logs: RefCell::new(Vec::new()),
            last_log_from_block: RefCell::new(None),
        }
    }

    pub fn set_nonce(&self, owner: Address, nonce: u64) {
        self.nonces.borrow_mut().insert(owner, nonce);
    }

    pub fn nonce_of(&self, owner: &Address) -> u64 {
        self.nonces.borrow().get(owner).copied().unwrap_or(0)
    }

    pub fn set_relayer_balance(&self, balance: BigUint) {
        *self.relayer_balance.borrow_mut() = balance;
    }

    /// The next broadcast fails with a node error carrying `message`.
    pub fn fail_next_send(&self, message: &str) {
        self.send_failures.borrow_mut().push(message.to_string());
    }

    /// The pending count stops following broadcasts, as when the node has
    /// not seen them yet.
    pub fn freeze_pending_count(&self) {
        self.pending_frozen.set(true);
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.borrow().clone()
    }

    pub fn rpc_calls(&self) -> usize {
        self.rpc_calls.get()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.get()
    }

    pub fn estimate_calls(&self) -> usize {
        self.estimate_calls.get()
    }

    pub fn set_flags(&self, user: Address, verified: bool, over18: bool, over65: bool) {
        self.flags
            .borrow_mut()
            .insert(user, [verified, over18, over65]);
    }

    pub fn set_token_balance(&self, user: Address, amount: U256) {
        self.token_balances.borrow_mut().insert(user, amount);
    }

    pub fn break_token(&self) {
        self.token_broken.set(true);
    }

    pub fn break_verifier(&self) {
        self.verifier_broken.set(true);
    }

    pub fn set_minting_paused(&self, paused: bool) {
        self.minting_paused.set(paused);
    }

    pub fn push_verified(&self, user: Address) {
        self.verified_logs.borrow_mut().push(user);
    }

    pub fn push_revoked(&self, user: Address) {
        self.revoked_logs.borrow_mut().push(user);
    }

    pub fn last_log_from_block(&self) -> Option<String> {
        self.last_log_from_block.borrow().clone()
    }

    fn eth_call(&self, to: Address, data: &[u8]) -> RelayResult<Vec<u8>> {
        let selector: [u8; 4] = data[..4].try_into().unwrap();

        if to == self.forwarder {
            match selector {
                IForwarder::noncesCall::SELECTOR => {
                    let call = IForwarder::noncesCall::abi_decode(data, true).unwrap();
                    return Ok(U256::from(self.nonce_of(&call.owner)).abi_encode());
                }
                IForwarder::verifyCall::SELECTOR => {
                    self.verify_calls.set(self.verify_calls.get() + 1);
                    let call = IForwarder::verifyCall::abi_decode(data, true).unwrap();
                    let request = ForwardRequestData::from_sol(&call.request).unwrap();
                    return Ok(self.verifies(&request).abi_encode());
                }
                _ => {}
            }
        }
        if to == VERIFIER {
            if self.verifier_broken.get() {
                return Err(revert(None));
            }
            let index = match selector {
                IAgeVerifier::isVerifiedCall::SELECTOR => 0,
                IAgeVerifier::isOver18Call::SELECTOR => 1,
                IAgeVerifier::isOver65Call::SELECTOR => 2,
                _ => return Err(revert(None)),
            };
            let user = Address::abi_decode(&data[4..], true).unwrap();
            let flags = self.flags.borrow().get(&user).copied().unwrap_or([false; 3]);
            return Ok(flags[index].abi_encode());
        }
        if to == TOKEN {
            if selector == IRewardToken::mintingPausedCall::SELECTOR {
                return Ok(self.minting_paused.get().abi_encode());
            }
            if self.token_broken.get() {
                return Err(revert(None));
            }
            match selector {
                IRewardToken::balanceOfCall::SELECTOR => {
                    let call = IRewardToken::balanceOfCall::abi_decode(data, true).unwrap();
                    let balances = self.token_balances.borrow();
                    let balance = balances.get(&call.account).copied().unwrap_or_default();
                    return Ok(balance.abi_encode());
                }
                IRewardToken::decimalsCall::SELECTOR => return Ok(<alloy_sol_types::sol_data::Uint<8> as alloy_sol_types::SolType>::abi_encode(&18u8)),
                _ => {}
            }
        }
        Err(revert(None))
    }

    fn verifies(&self, request: &ForwardRequestData) -> bool {
        let typed = self.builder.build(
            request.from,
            request.to,
            request.data.clone(),
            request.gas,
            request.deadline,
            U256::from(self.nonce_of(&request.from)),
        );
        request.value.is_zero()
            && request.to == self.claim
            && typed.recover_signer(&request.signature).ok() == Some(request.from)
    }

    fn estimate(&self, to: Address, data: &[u8]) -> RelayResult<Value> {
        self.estimate_calls.set(self.estimate_calls.get() + 1);
        assert_eq!(to, self.forwarder);
        let request = decode_execute(data).unwrap();
        if request.deadline.is_expired(NOW) {
            let revert_data = IForwarder::ERC2771ForwarderExpiredRequest {
                deadline: request.deadline.into(),
            }
            .abi_encode();
            return Err(revert(Some(revert_data)));
        }
        if !self.verifies(&request) {
            return Err(revert(None));
        }
        Ok(json!(format!("0x{:x}", GAS_ESTIMATE)))
    }

    fn send(&self, raw_hex: &str) -> RelayResult<Value> {
        if let Some(message) = self.send_failures.borrow_mut().pop() {
            return Err(RelayError::Rpc {
                code: -32_000,
                message,
                data: None,
            });
        }
        let raw = parse_hex_bytes(raw_hex).unwrap();
        let tx = decode_transaction(&raw);
        let request = decode_execute(&tx.data).unwrap();
        *self.nonces.borrow_mut().entry(request.from).or_insert(0) += 1;
        if !self.pending_frozen.get() {
            self.pending.set(self.pending.get() + 1);
        }
        self.sent.borrow_mut().push(tx);
        Ok(json!(to_hex_prefixed(&keccak256(&raw))))
    }

    fn logs(&self, filter: &Value) -> Value {
        *self.last_log_from_block.borrow_mut() = filter["fromBlock"].as_str().map(str::to_string);
        let topic0 = filter["topics"][0].as_str().unwrap().to_string();
        let accounts = if topic0 == to_hex_prefixed(&address_verified_topic()) {
            self.verified_logs.borrow().clone()
        } else if topic0 == to_hex_prefixed(&verification_revoked_topic()) {
            self.revoked_logs.borrow().clone()
        } else {
            Vec::new()
        };
        Value::Array(
            accounts
                .iter()
                .map(|account| {
                    json!({
                        "topics": [topic0.clone(), to_hex_prefixed(&account.abi_encode())],
                        "data": to_hex_prefixed(&U256::from(1u8).abi_encode()),
                    })
                })
                .collect(),
        )
    }
}

impl EvmRpc for MockChain {
    async fn request(&self, method: &'static str, params: Value) -> RelayResult<Value> {
        self.rpc_calls.set(self.rpc_calls.get() + 1);
        let target = |p: &Value| parse_address(p["to"].as_str().unwrap()).unwrap();
        let call_data = |p: &Value| parse_hex_bytes(p["data"].as_str().unwrap()).unwrap();
        match method {
            "eth_call" => {
                let bytes = self.eth_call(target(&params[0]), &call_data(&params[0]))?;
                Ok(json!(to_hex_prefixed(&bytes)))
            }
            "eth_estimateGas" => self.estimate(target(&params[0]), &call_data(&params[0])),
            "eth_getBalance" => Ok(json!(to_quantity(&self.relayer_balance.borrow()))),
            "eth_getTransactionCount" => Ok(json!(format!("0x{:x}", self.pending.get()))),
            "eth_getBlockByNumber" => Ok(json!({
                "number": format!("0x{:x}", LATEST_BLOCK),
                "baseFeePerGas": "0x2540be400",
            })),
            "eth_maxPriorityFeePerGas" => Ok(json!("0x77359400")),
            "eth_sendRawTransaction" => self.send(params[0].as_str().unwrap()),
            "eth_chainId" => Ok(json!(format!("0x{:x}", DEFAULT_CHAIN_ID))),
            "eth_blockNumber" => Ok(json!(format!("0x{:x}", LATEST_BLOCK))),
            "eth_getLogs" => Ok(self.logs(&params[0])),
            other => panic!("unexpected rpc method {}", other),
        }
    }
}

fn revert(data: Option<Vec<u8>>) -> RelayError {
    RelayError::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
        data: data.map(|d| to_hex_prefixed(&d)),
    }
}

enum Rlp {
    Bytes(Vec<u8>),
    List(Vec<Rlp>),
}

impl Rlp {
    fn bytes(&self) -> &[u8] {
        match self {
            Rlp::Bytes(bytes) => bytes,
            Rlp::List(_) => panic!("expected rlp string"),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Rlp::Bytes(bytes) => rlp_encode_bytes(bytes),
            Rlp::List(items) => rlp_encode_list(&items.iter().map(Rlp::encode).collect::<Vec<_>>()),
        }
    }
}

fn be_usize(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, b| (acc << 8) | *b as usize)
}

fn decode_rlp(data: &[u8]) -> (Rlp, usize) {
    let prefix = data[0];
    match prefix {
        0x00..=0x7f => (Rlp::Bytes(vec![prefix]), 1),
        0x80..=0xb7 => {
            let len = (prefix - 0x80) as usize;
            (Rlp::Bytes(data[1..1 + len].to_vec()), 1 + len)
        }
        0xb8..=0xbf => {
            let len_len = (prefix - 0xb7) as usize;
            let len = be_usize(&data[1..1 + len_len]);
            let start = 1 + len_len;
            (Rlp::Bytes(data[start..start + len].to_vec()), start + len)
        }
        0xc0..=0xf7 => {
            let len = (prefix - 0xc0) as usize;
            (Rlp::List(decode_rlp_items(&data[1..1 + len])), 1 + len)
        }
        _ => {
            let len_len = (prefix - 0xf7) as usize;
            let len = be_usize(&data[1..1 + len_len]);
            let start = 1 + len_len;
            (Rlp::List(decode_rlp_items(&data[start..start + len])), start + len)
        }
    }
}

fn decode_rlp_items(mut data: &[u8]) -> Vec<Rlp> {
    let mut items = Vec::new();
    while !data.is_empty() {
        let (item, used) = decode_rlp(data);
        items.push(item);
        data = &data[used..];
    }
    items
}

fn decode_transaction(raw: &[u8]) -> SentTx {
    assert_eq!(raw[0], 0x02, "not a type 2 transaction");
    let (Rlp::List(items), _) = decode_rlp(&raw[1..]) else {
        panic!("transaction payload is not a list");
    };
    assert_eq!(items.len(), 12);
    assert_eq!(
        be_usize(items[0].bytes()) as u64,
        DEFAULT_CHAIN_ID,
        "wrong chain id"
    );

    let unsigned: Vec<Vec<u8>> = items[..9].iter().map(Rlp::encode).collect();
    let mut payload = vec![0x02];
    payload.extend_from_slice(&rlp_encode_list(&unsigned));
    let digest = keccak256(&payload);

    let to_word = |bytes: &[u8]| {
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        out
    };
    let parity = items[9].bytes().first().copied().unwrap_or(0);
    let signature = Signature::from_parts(to_word(items[10].bytes()), to_word(items[11].bytes()), parity);

    SentTx {
        from: signature.recover(&digest).unwrap(),
        to: Address::try_from(items[5].bytes()).unwrap(),
        nonce: be_usize(items[1].bytes()) as u64,
        data: items[7].bytes().to_vec(),
    }
}
