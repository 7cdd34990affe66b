//! EIP-1559 (type 2) transactions and the RLP subset needed to encode them.

use forwarder::{keccak256, Address, Signature};
use num_bigint::BigUint;

use crate::error::RelayResult;

const TX_TYPE: u8 = 0x02;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: BigUint,
    pub max_fee_per_gas: BigUint,
    pub gas_limit: BigUint,
    pub to: Address,
    pub value: BigUint,
    pub data: Vec<u8>,
}

impl Eip1559Transaction {
    fn unsigned_items(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_encode_u64(self.chain_id),
            rlp_encode_u64(self.nonce),
            rlp_encode_uint(&self.max_priority_fee_per_gas),
            rlp_encode_uint(&self.max_fee_per_gas),
            rlp_encode_uint(&self.gas_limit),
            rlp_encode_bytes(self.to.as_slice()),
            rlp_encode_uint(&self.value),
            rlp_encode_bytes(&self.data),
            rlp_encode_list(&[]), // access list
        ]
    }

    /// `keccak256(0x02 || rlp([chain_id, nonce, ..., access_list]))`.
    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&typed_payload(&rlp_encode_list(&self.unsigned_items())))
    }

    /// Raw bytes for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &Signature) -> RelayResult<Vec<u8>> {
        let mut items = self.unsigned_items();
        items.push(rlp_encode_u64(u64::from(signature.y_parity()?)));
        items.push(rlp_encode_bytes(&trim_leading_zeroes(signature.r())));
        items.push(rlp_encode_bytes(&trim_leading_zeroes(signature.s())));
        Ok(typed_payload(&rlp_encode_list(&items)))
    }
}

fn typed_payload(rlp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + rlp.len());
    out.push(TX_TYPE);
    out.extend_from_slice(rlp);
    out
}

fn trim_leading_zeroes(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| *b != 0).unwrap_or(data.len());
    &data[start..]
}

fn length_to_bytes(len: usize) -> Vec<u8> {
    trim_leading_zeroes(&len.to_be_bytes()).to_vec()
}

pub fn rlp_encode_bytes(data: &[u8]) -> Vec<u8> {
    match data.len() {
        1 if data[0] < 0x80 => vec![data[0]],
        len if len <= 55 => {
            let mut out = Vec::with_capacity(1 + len);
            out.push(0x80 + len as u8);
            out.extend_from_slice(data);
            out
        }
        len => {
            let len_bytes = length_to_bytes(len);
            let mut out = Vec::with_capacity(1 + len_bytes.len() + len);
            out.push(0xB7 + len_bytes.len() as u8);
            out.extend_from_slice(&len_bytes);
            out.extend_from_slice(data);
            out
        }
    }
}

/// Integers are big-endian with no leading zeros; zero is the empty string.
pub fn rlp_encode_uint(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    rlp_encode_bytes(trim_leading_zeroes(&bytes))
}

pub fn rlp_encode_u64(value: u64) -> Vec<u8> {
    rlp_encode_bytes(trim_leading_zeroes(&value.to_be_bytes()))
}

pub fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let total_len: usize = items.iter().map(Vec::len).sum();
    let mut out = if total_len <= 55 {
        let mut out = Vec::with_capacity(1 + total_len);
        out.push(0xC0 + total_len as u8);
        out
    } else {
        let len_bytes = length_to_bytes(total_len);
        let mut out = Vec::with_capacity(1 + len_bytes.len() + total_len);
        out.push(0xF7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out
    };
    for item in items {
        out.extend_from_slice(item);
    }
    out
}
