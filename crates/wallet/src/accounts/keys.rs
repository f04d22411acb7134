//! Key material and address derivation.

use crate::{error::ValidationError, security::SecretBytes};
use alloy_primitives::{Address, B256, Keccak256, hex};
use alloy_signer_local::PrivateKeySigner;
use ed25519_dalek::SigningKey;

/// A secp256k1 private key.
#[derive(Debug)]
pub struct EvmKey {
    secret: SecretBytes,
    address: Address,
}

impl EvmKey {
    /// Generates a fresh key.
    pub fn random() -> Self {
        loop {
            let secret = SecretBytes::random(32);
            // out of range scalars are astronomically unlikely, draw again if it happens
            if let Ok(key) = Self::from_secret(secret) {
                return key;
            }
        }
    }

    /// Imports a 32 byte hex private key, with or without `0x`.
    pub fn from_hex(raw: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|err| ValidationError::InvalidPrivateKey(err.to_string()))?;
        Self::from_secret(SecretBytes::new(bytes))
    }

    fn from_secret(secret: SecretBytes) -> Result<Self, ValidationError> {
        if secret.len() != 32 {
            return Err(ValidationError::InvalidPrivateKey(format!(
                "expected 32 bytes, got {}",
                secret.len()
            )));
        }
        let signer = PrivateKeySigner::from_slice(secret.expose())
            .map_err(|err| ValidationError::InvalidPrivateKey(err.to_string()))?;
        Ok(Self { address: signer.address(), secret })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Deterministic 65 byte `r || s || v` stand-in signature over `payload`.
    pub fn mock_sign(&self, payload: &[u8]) -> [u8; 65] {
        let mut signature: [u8; 65] = mock_signature(self.secret.expose(), payload);
        signature[64] = 27 + (signature[64] & 1);
        signature
    }

    pub fn wipe(&mut self) {
        self.secret.wipe();
    }

    pub fn is_wiped(&self) -> bool {
        self.secret.is_wiped()
    }
}

/// An ed25519 keypair seed.
#[derive(Debug)]
pub struct SolanaKey {
    secret: SecretBytes,
    public_key: [u8; 32],
}

impl SolanaKey {
    pub fn random() -> Self {
        let secret = SecretBytes::random(32);
        let public_key = derive_public_key(secret.expose());
        Self { secret, public_key }
    }

    /// Imports a secret key given as base58, `0x` hex or a JSON byte array, either the 32 byte
    /// seed or the 64 byte `seed || public key` keypair.
    pub fn from_encoded(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let invalid = |reason: String| ValidationError::InvalidSecretKey(reason);
        let bytes = if raw.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(raw).map_err(|err| invalid(err.to_string()))?
        } else if raw.starts_with("0x") {
            hex::decode(raw).map_err(|err| invalid(err.to_string()))?
        } else {
            bs58::decode(raw).into_vec().map_err(|err| invalid(err.to_string()))?
        };
        Self::from_bytes(SecretBytes::new(bytes))
    }

    fn from_bytes(bytes: SecretBytes) -> Result<Self, ValidationError> {
        match bytes.len() {
            32 => {
                let public_key = derive_public_key(bytes.expose());
                Ok(Self { secret: bytes, public_key })
            }
            64 => {
                let secret = SecretBytes::new(bytes.expose()[..32].to_vec());
                let public_key = derive_public_key(secret.expose());
                if public_key[..] != bytes.expose()[32..] {
                    return Err(ValidationError::InvalidSecretKey(
                        "public key half does not match the seed".to_string(),
                    ));
                }
                Ok(Self { secret, public_key })
            }
            len => Err(ValidationError::InvalidSecretKey(format!(
                "expected 32 or 64 bytes, got {len}"
            ))),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key
    }

    /// Base58 encoded public key, the Solana address.
    pub fn public_key(&self) -> String {
        bs58::encode(self.public_key).into_string()
    }

    /// Deterministic 64 byte stand-in signature over `payload`.
    pub fn mock_sign(&self, payload: &[u8]) -> [u8; 64] {
        mock_signature(self.secret.expose(), payload)
    }

    pub fn wipe(&mut self) {
        self.secret.wipe();
    }

    pub fn is_wiped(&self) -> bool {
        self.secret.is_wiped()
    }
}

fn derive_public_key(seed: &[u8]) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(seed);
    let key = SigningKey::from_bytes(&buf);
    buf.fill(0);
    key.verifying_key().to_bytes()
}

/// Expands `keccak256(secret || payload)` into `N` bytes by rehashing.
fn mock_signature<const N: usize>(secret: &[u8], payload: &[u8]) -> [u8; N] {
    let mut hasher = Keccak256::new();
    hasher.update(secret);
    hasher.update(payload);
    let mut block: B256 = hasher.finalize();

    let mut out = [0u8; N];
    for chunk in out.chunks_mut(32) {
        chunk.copy_from_slice(&block[..chunk.len()]);
        block = alloy_primitives::keccak256(block);
    }
    out
}
