//! Wallet level errors

use crate::{accounts::AccountType, security::SecurityViolation};
use headless_wallet_rpc::error::RpcError;

/// Malformed account or chain configuration.
///
/// Always raised before anything is applied, a failed call leaves registries untouched.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid chain id `{0}`")]
    InvalidChainId(String),
    #[error("chain `{0}` is already registered")]
    DuplicateChain(String),
    #[error("unrecognized chain `{0}`")]
    UnknownChain(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("{chain} configuration is not allowed for {account_type} accounts")]
    UnexpectedChainConfig { account_type: AccountType, chain: &'static str },
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("account `{0}` not found")]
    UnknownAccount(String),
    #[error("account index {index} out of range for {len} accounts")]
    AccountIndexOutOfRange { index: usize, len: usize },
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error(transparent)]
    Security(#[from] SecurityViolation),
}

impl ValidationError {
    pub(crate) fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { field, reason: reason.into() }
    }
}

impl From<ValidationError> for RpcError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownChain(chain_id) => Self::unrecognized_chain(&chain_id),
            ValidationError::UnknownAccount(account) => Self::account_not_found(&account),
            err => Self::invalid_params(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headless_wallet_rpc::error::ErrorCode;

    #[test]
    fn maps_to_provider_codes() {
        let err: RpcError = ValidationError::UnknownChain("0x539".to_string()).into();
        assert_eq!(err.code, ErrorCode::UnrecognizedChain);

        let err: RpcError = ValidationError::MissingField("chainName").into();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert!(err.message.contains("chainName"));
    }
}
