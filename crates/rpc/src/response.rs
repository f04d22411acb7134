use crate::error::RpcError;
use serde::{Deserialize, Serialize};

/// Represents the result of a provider call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseResult {
    #[serde(rename = "result")]
    Success(serde_json::Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

impl ResponseResult {
    pub fn success<S>(content: S) -> Self
    where
        S: Serialize + 'static,
    {
        Ok::<_, RpcError>(content).to_rpc_result()
    }

    pub fn error(error: RpcError) -> Self {
        Self::Error(error)
    }

    /// Converts into a plain [`Result`].
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Error(err) => Err(err),
        }
    }
}

impl From<RpcError> for ResponseResult {
    fn from(err: RpcError) -> Self {
        Self::error(err)
    }
}

/// Helper trait to easily convert results to rpc results
pub trait ToRpcResponseResult {
    fn to_rpc_result(self) -> ResponseResult;
}

impl<T: Serialize, E: Into<RpcError>> ToRpcResponseResult for Result<T, E> {
    fn to_rpc_result(self) -> ResponseResult {
        match self {
            Ok(val) => match serde_json::to_value(val) {
                Ok(value) => ResponseResult::Success(value),
                Err(err) => ResponseResult::Error(RpcError::internal_error_with(format!(
                    "failed to serialize response: {err}"
                ))),
            },
            Err(err) => ResponseResult::Error(err.into()),
        }
    }
}
