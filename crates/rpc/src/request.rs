use crate::error::RpcError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// An EIP-1193 `request({ method, params })` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// The method name, e.g. `eth_requestAccounts`
    pub method: String,
    /// The (optional) parameters
    #[serde(default, skip_serializing_if = "RequestParams::is_none")]
    pub params: RequestParams,
}

impl Request {
    /// Creates a request without parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), params: RequestParams::None }
    }

    /// Creates a request with positional parameters.
    pub fn with_params(method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self { method: method.into(), params: RequestParams::Array(params) }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)
    }
}

/// Represents the `params` field of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestParams {
    /// positional params
    Array(Vec<serde_json::Value>),
    /// params by name
    Object(serde_json::Map<String, serde_json::Value>),
    /// no params (missing or `null`)
    #[default]
    None,
}

impl RequestParams {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Number of positional params, an object counts as a single param.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(params) => params.len(),
            Self::Object(_) => 1,
            Self::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw value at `index`, an object param is treated as the sole positional param.
    pub fn get(&self, index: usize) -> Option<serde_json::Value> {
        match self {
            Self::Array(params) => params.get(index).cloned(),
            Self::Object(obj) if index == 0 => Some(serde_json::Value::Object(obj.clone())),
            _ => None,
        }
    }

    /// Deserializes the required positional param at `index`.
    pub fn param<T: DeserializeOwned>(&self, index: usize) -> Result<T, RpcError> {
        let value = self
            .get(index)
            .ok_or_else(|| RpcError::invalid_params(format!("missing param at index {index}")))?;
        serde_json::from_value(value)
            .map_err(|err| RpcError::invalid_params(format!("invalid param at index {index}: {err}")))
    }

    /// Deserializes the optional positional param at `index`, `null` is treated as missing.
    pub fn optional_param<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, RpcError> {
        match self.get(index) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|err| {
                RpcError::invalid_params(format!("invalid param at index {index}: {err}"))
            }),
        }
    }
}

impl From<Vec<serde_json::Value>> for RequestParams {
    fn from(params: Vec<serde_json::Value>) -> Self {
        Self::Array(params)
    }
}
