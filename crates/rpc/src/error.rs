//! JSON-RPC and EIP-1193 provider error bindings
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, fmt};

/// Represents a structured provider error, as returned by `request` of an EIP-1193 provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcError {
    pub code: ErrorCode,
    /// error message
    pub message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// New [`RpcError`] with the given [`ErrorCode`].
    pub const fn new(code: ErrorCode) -> Self {
        Self { message: Cow::Borrowed(code.message()), code, data: None }
    }

    /// New [`RpcError`] with the given [`ErrorCode`] and a custom message.
    pub fn with_message<M>(code: ErrorCode, message: M) -> Self
    where
        M: Into<String>,
    {
        Self { code, message: message.into().into(), data: None }
    }

    /// Attaches additional data to the error.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Creates a new `ParseError` error.
    pub const fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError)
    }

    /// Creates a new `MethodNotFound` error.
    pub const fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound)
    }

    /// Creates a new `MethodNotFound` error naming the unsupported method.
    pub fn method_not_supported(method: &str) -> Self {
        Self::with_message(ErrorCode::MethodNotFound, format!("method not supported: {method}"))
    }

    /// Creates a new `InvalidRequest` error.
    pub const fn invalid_request() -> Self {
        Self::new(ErrorCode::InvalidRequest)
    }

    /// Creates a new `InternalError` error.
    pub const fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }

    /// Creates a new `InvalidParams` error.
    pub fn invalid_params<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::with_message(ErrorCode::InvalidParams, message)
    }

    /// Creates a new `InternalError` error with a message.
    pub fn internal_error_with<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::with_message(ErrorCode::InternalError, message)
    }

    /// Creates a new `UserRejectedRequest` (4001) error.
    pub fn user_rejected<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::with_message(ErrorCode::UserRejectedRequest, message)
    }

    /// Creates a new `Unauthorized` (4100) error.
    pub fn unauthorized<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::with_message(ErrorCode::Unauthorized, message)
    }

    /// Creates a new `UnsupportedMethod` (4200) error.
    pub fn unsupported_method<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::with_message(ErrorCode::UnsupportedMethod, message)
    }

    /// Creates a new `Disconnected` (4900) error.
    pub const fn disconnected() -> Self {
        Self::new(ErrorCode::Disconnected)
    }

    /// Creates a new `UnrecognizedChain` (4902) error for the given chain id.
    pub fn unrecognized_chain(chain_id: &str) -> Self {
        Self::with_message(
            ErrorCode::UnrecognizedChain,
            format!("Unrecognized chain ID \"{chain_id}\". Try adding the chain using wallet_addEthereumChain first."),
        )
    }

    /// Creates the error returned when no known account matches the given address.
    pub fn account_not_found(address: &str) -> Self {
        Self::with_message(ErrorCode::Unauthorized, format!("account not found: {address}"))
    }

    /// Returns the numeric error code.
    pub fn code(&self) -> i64 {
        self.code.code()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.message(), self.message)
    }
}

impl std::error::Error for RpcError {}

/// List of JSON-RPC and EIP-1193 provider error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Server received Invalid JSON.
    ParseError,
    /// send invalid request object.
    InvalidRequest,
    /// method does not exist or valid
    MethodNotFound,
    /// invalid method parameter.
    InvalidParams,
    /// internal call error
    InternalError,
    /// The user rejected the request, see [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193#provider-errors)
    UserRejectedRequest,
    /// The requested method and/or account has not been authorized by the user.
    Unauthorized,
    /// The provider does not support the requested method.
    UnsupportedMethod,
    /// The provider is disconnected from all chains.
    Disconnected,
    /// The provider is not connected to the requested chain.
    ChainDisconnected,
    /// The requested chain has not been added, see [EIP-3085](https://eips.ethereum.org/EIPS/eip-3085)
    UnrecognizedChain,
    /// Used for server specific errors.
    ServerError(i64),
}

impl ErrorCode {
    /// Returns the error code as `i64`
    pub fn code(&self) -> i64 {
        match *self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::UserRejectedRequest => 4001,
            Self::Unauthorized => 4100,
            Self::UnsupportedMethod => 4200,
            Self::Disconnected => 4900,
            Self::ChainDisconnected => 4901,
            Self::UnrecognizedChain => 4902,
            Self::ServerError(c) => c,
        }
    }

    /// Returns the message associated with the error
    pub const fn message(&self) -> &'static str {
        match *self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::UserRejectedRequest => "User rejected the request",
            Self::Unauthorized => "Unauthorized",
            Self::UnsupportedMethod => "Unsupported method",
            Self::Disconnected => "Disconnected",
            Self::ChainDisconnected => "Chain disconnected",
            Self::UnrecognizedChain => "Unrecognized chain",
            Self::ServerError(_) => "Server error",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl<'a> Deserialize<'a> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'a>,
    {
        i64::deserialize(deserializer).map(Into::into)
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            4001 => Self::UserRejectedRequest,
            4100 => Self::Unauthorized,
            4200 => Self::UnsupportedMethod,
            4900 => Self::Disconnected,
            4901 => Self::ChainDisconnected,
            4902 => Self::UnrecognizedChain,
            _ => Self::ServerError(code),
        }
    }
}
