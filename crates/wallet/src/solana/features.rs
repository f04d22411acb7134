//! Wallet Standard features and their payloads.

use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Version of the Wallet Standard the wallet implements.
pub const WALLET_STANDARD_VERSION: &str = "1.0.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Connect,
    Disconnect,
    Events,
    SignTransaction,
    SignMessage,
    SignAndSendTransaction,
}

impl Feature {
    pub const ALL: [Self; 6] = [
        Self::Connect,
        Self::Disconnect,
        Self::Events,
        Self::SignTransaction,
        Self::SignMessage,
        Self::SignAndSendTransaction,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "standard:connect",
            Self::Disconnect => "standard:disconnect",
            Self::Events => "standard:events",
            Self::SignTransaction => "solana:signTransaction",
            Self::SignMessage => "solana:signMessage",
            Self::SignAndSendTransaction => "solana:signAndSendTransaction",
        }
    }

    /// Features that operate on a specific account.
    pub const fn is_account_feature(&self) -> bool {
        matches!(self, Self::SignTransaction | Self::SignMessage | Self::SignAndSendTransaction)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.name() == s)
            .ok_or_else(|| format!("unsupported feature `{s}`"))
    }
}

/// An account as exposed through the Wallet Standard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    /// Base58 public key.
    pub address: String,
    pub public_key: Vec<u8>,
    pub chains: Vec<String>,
    pub features: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Registration info of the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub version: &'static str,
    pub name: String,
    pub icon: String,
    pub chains: Vec<String>,
    pub features: Vec<&'static str>,
    pub accounts: Vec<WalletAccount>,
}

/// Raw bytes given either as a number array or as a base58 string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Bytes(pub Vec<u8>);

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Raw(Vec<u8>),
            Base58(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Raw(bytes) => Ok(Self(bytes)),
            Repr::Base58(encoded) => bs58::decode(&encoded)
                .into_vec()
                .map(Self)
                .map_err(|err| serde::de::Error::custom(format!("invalid base58: {err}"))),
        }
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInput {
    #[serde(default)]
    pub silent: bool,
    /// Phantom style alias of `silent`.
    #[serde(default)]
    pub only_if_trusted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectOutput {
    pub accounts: Vec<WalletAccount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionInput {
    /// Base58 public key of the signing account.
    pub account: String,
    pub transaction: Bytes,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionOutput {
    pub signed_transaction: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SignMessageInput {
    pub account: String,
    pub message: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageOutput {
    pub signed_message: Bytes,
    pub signature: Bytes,
    pub signature_type: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAndSendTransactionInput {
    pub account: String,
    pub transaction: Bytes,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignAndSendTransactionOutput {
    pub signature: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_names_roundtrip() {
        for feature in Feature::ALL {
            assert_eq!(feature.name().parse::<Feature>().unwrap(), feature);
        }
        assert!("solana:signIn".parse::<Feature>().is_err());
    }

    #[test]
    fn bytes_from_array_or_base58() {
        let raw: Bytes = serde_json::from_value(serde_json::json!([1, 2, 3])).unwrap();
        assert_eq!(raw.0, vec![1, 2, 3]);
        let encoded = bs58::encode([1u8, 2, 3]).into_string();
        let decoded: Bytes = serde_json::from_value(serde_json::json!(encoded)).unwrap();
        assert_eq!(decoded, raw);
        assert!(serde_json::from_value::<Bytes>(serde_json::json!("0OIl")).is_err());
    }
}
