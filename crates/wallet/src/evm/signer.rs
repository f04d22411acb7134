//! Deterministic stand-ins for signatures and transaction hashes.
//!
//! Nothing here produces a signature that verifies on chain.

use crate::accounts::EvmKey;
use alloy_primitives::{B256, Keccak256, hex, keccak256};
use serde_json::Value;

/// Decodes a `personal_sign` message: `0x` hex is taken as raw bytes, anything else as UTF-8.
pub fn message_bytes(message: &str) -> Vec<u8> {
    match message.strip_prefix("0x") {
        Some(_) => hex::decode(message).unwrap_or_else(|_| message.as_bytes().to_vec()),
        None => message.as_bytes().to_vec(),
    }
}

/// EIP-191 prefixed payload.
pub fn eip191_payload(message: &[u8]) -> Vec<u8> {
    let mut payload = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    payload.extend_from_slice(message);
    payload
}

pub fn personal_sign(key: &EvmKey, message: &str) -> String {
    hex::encode_prefixed(key.mock_sign(&eip191_payload(&message_bytes(message))))
}

pub fn sign_typed_data(key: &EvmKey, data: &Value) -> String {
    // serde_json maps are sorted, the encoding is stable
    let mut payload = b"\x19\x01".to_vec();
    payload.extend_from_slice(data.to_string().as_bytes());
    hex::encode_prefixed(key.mock_sign(&payload))
}

/// Hash for a submitted transaction, unique per `nonce`.
pub fn transaction_hash(chain_id: &str, tx: &Value, nonce: u64) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(chain_id.as_bytes());
    hasher.update(tx.to_string().as_bytes());
    hasher.update(nonce.to_be_bytes());
    keccak256(hasher.finalize())
}
