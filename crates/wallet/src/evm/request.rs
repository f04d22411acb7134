//! Typed EVM provider requests.

use super::legacy::{LegacyOutcome, LegacyShim};
use headless_wallet_rpc::{
    error::RpcError,
    request::{Request, RequestParams},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `wallet_switchEthereumChain` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainParams {
    pub chain_id: String,
}

/// `wallet_addEthereumChain` (EIP-3085) parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub chain_name: Option<String>,
    #[serde(default)]
    pub rpc_urls: Option<Vec<String>>,
    #[serde(default)]
    pub native_currency: Option<NativeCurrency>,
    #[serde(default)]
    pub block_explorer_urls: Option<Vec<String>>,
    #[serde(default)]
    pub icon_urls: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_watchAsset` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WatchAssetParams {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub options: WatchAssetOptions,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WatchAssetOptions {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub image: Option<String>,
}

/// `eth_sendTransaction` parameter, unknown fields are kept for hashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A parsed provider request.
#[derive(Clone, Debug, PartialEq)]
pub enum EvmRequest {
    RequestAccounts,
    Accounts,
    ChainId,
    NetVersion,
    Coinbase,
    ClientVersion,
    SwitchChain(SwitchChainParams),
    AddChain(AddChainParams),
    RequestPermissions(Map<String, Value>),
    GetPermissions,
    RevokePermissions(Map<String, Value>),
    WatchAsset(WatchAssetParams),
    PersonalSign { message: String, address: String },
    EthSign { address: String, message: String },
    SignTypedData { address: String, data: Value },
    SendTransaction(TransactionParams),
    /// A deprecated method answered without further processing.
    Legacy(LegacyOutcome),
}

impl EvmRequest {
    /// Parses `request`, deprecated methods go through `legacy`.
    pub fn parse(request: &Request, legacy: &LegacyShim) -> Result<Self, RpcError> {
        let params = &request.params;
        let mut method = request.method.as_str();
        if let Some(outcome) = legacy.handle(method) {
            match outcome {
                LegacyOutcome::Redirect(target) => method = target,
                outcome => return Ok(Self::Legacy(outcome)),
            }
        }

        let req = match method {
            "eth_requestAccounts" => Self::RequestAccounts,
            "eth_accounts" => Self::Accounts,
            "eth_chainId" => Self::ChainId,
            "net_version" => Self::NetVersion,
            "eth_coinbase" => Self::Coinbase,
            "web3_clientVersion" => Self::ClientVersion,
            "wallet_switchEthereumChain" => Self::SwitchChain(params.param(0)?),
            "wallet_addEthereumChain" => Self::AddChain(params.param(0)?),
            "wallet_requestPermissions" => Self::RequestPermissions(params.param(0)?),
            "wallet_getPermissions" => Self::GetPermissions,
            "wallet_revokePermissions" => Self::RevokePermissions(params.param(0)?),
            "wallet_watchAsset" => Self::WatchAsset(params.param(0)?),
            "personal_sign" => {
                let (message, address) = personal_sign_params(params)?;
                Self::PersonalSign { message, address }
            }
            "eth_sign" => Self::EthSign { address: params.param(0)?, message: params.param(1)? },
            "eth_signTypedData_v4" => {
                let address = params.param(0)?;
                let data = match params.param::<Value>(1)? {
                    Value::String(raw) => serde_json::from_str(&raw).map_err(|err| {
                        RpcError::invalid_params(format!("invalid typed data: {err}"))
                    })?,
                    data => data,
                };
                Self::SignTypedData { address, data }
            }
            "eth_sendTransaction" => Self::SendTransaction(params.param(0)?),
            _ => return Err(RpcError::method_not_supported(&request.method)),
        };
        Ok(req)
    }

    /// Whether the request needs a connected provider.
    pub fn requires_connection(&self) -> bool {
        matches!(
            self,
            Self::PersonalSign { .. }
                | Self::EthSign { .. }
                | Self::SignTypedData { .. }
                | Self::SendTransaction(_)
        )
    }
}

/// `personal_sign` takes `[message, address]`, but some dapps send `[address, message]`.
fn personal_sign_params(params: &RequestParams) -> Result<(String, String), RpcError> {
    let first: String = params.param(0)?;
    let second: String = params.param(1)?;
    if is_address(&first) && !is_address(&second) {
        Ok((second, first))
    } else {
        Ok((first, second))
    }
}

pub(crate) fn is_address(s: &str) -> bool {
    s.len() == 42
        && (s.starts_with("0x") || s.starts_with("0X"))
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use headless_wallet_rpc::error::ErrorCode;
    use serde_json::json;

    const ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn parse(method: &str, params: Vec<Value>) -> Result<EvmRequest, RpcError> {
        EvmRequest::parse(&Request::with_params(method, params), &LegacyShim::new())
    }

    #[test]
    fn parses_wallet_methods() {
        assert_eq!(parse("eth_requestAccounts", vec![]).unwrap(), EvmRequest::RequestAccounts);
        assert_eq!(
            parse("wallet_switchEthereumChain", vec![json!({"chainId": "0x89"})]).unwrap(),
            EvmRequest::SwitchChain(SwitchChainParams { chain_id: "0x89".into() })
        );
        let err = parse("wallet_switchEthereumChain", vec![]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn personal_sign_accepts_swapped_params() {
        let expected =
            EvmRequest::PersonalSign { message: "0x68656c6c6f".into(), address: ADDRESS.into() };
        assert_eq!(parse("personal_sign", vec![json!("0x68656c6c6f"), json!(ADDRESS)]).unwrap(), expected);
        assert_eq!(parse("personal_sign", vec![json!(ADDRESS), json!("0x68656c6c6f")]).unwrap(), expected);
    }

    #[test]
    fn typed_data_from_string() {
        let data = json!({"types": {}, "primaryType": "Mail", "domain": {}, "message": {}});
        let req = parse("eth_signTypedData_v3", vec![json!(ADDRESS), json!(data.to_string())]).unwrap();
        assert_eq!(req, EvmRequest::SignTypedData { address: ADDRESS.into(), data });
    }

    #[test]
    fn unknown_methods_are_not_supported() {
        let err = parse("eth_getBalance", vec![]).unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert!(err.message.contains("eth_getBalance"));
        assert!(matches!(parse("eth_mining", vec![]).unwrap(), EvmRequest::Legacy(_)));
    }
}
