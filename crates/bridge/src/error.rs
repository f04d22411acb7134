//! Bridge and installation errors

use crate::message::{ErrorPayload, MessageType};
use headless_wallet::SecurityViolation;
use std::time::Duration;

/// Errors raised by the driver side of the bridge.
///
/// Every variant maps to a stable [`BridgeError::code`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("`{message_type}` got no reply within {timeout:?}")]
    Timeout { message_type: MessageType, timeout: Duration },
    #[error("message of {size} bytes exceeds the limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("rate limit for `{message_type}` exceeded, retry in {retry_after:?}")]
    RateLimited { message_type: MessageType, retry_after: Duration },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// The page handled the message and answered with an error.
    #[error("{message} ({code})")]
    Remote { code: String, message: String },
    #[error("the bridge has been cleaned up")]
    Closed,
    #[error("the bridge has not been initialized")]
    NotInitialized,
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("page transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Security(#[from] SecurityViolation),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn code(&self) -> &str {
        match self {
            Self::Timeout { .. } => "TIMEOUT",
            Self::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Self::Remote { code, .. } => code,
            Self::Closed => "BRIDGE_CLOSED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Handshake(_) => "HANDSHAKE_FAILED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Security(_) => "SECURITY_VIOLATION",
            Self::Serde(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ErrorPayload> for BridgeError {
    fn from(payload: ErrorPayload) -> Self {
        Self::Remote { code: payload.code, message: payload.message }
    }
}

/// Errors of the install and remove lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum InstallationError {
    #[error("a wallet instance with id `{0}` is already installed")]
    DuplicateInstance(String),
    #[error("no wallet instance with id `{0}` is installed")]
    MissingInstance(String),
    #[error(transparent)]
    Security(#[from] SecurityViolation),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl InstallationError {
    pub fn code(&self) -> &str {
        match self {
            Self::DuplicateInstance(_) => "INSTANCE_EXISTS",
            Self::MissingInstance(_) => "INSTANCE_NOT_FOUND",
            Self::Security(_) => "SECURITY_VIOLATION",
            Self::Bridge(err) => err.code(),
        }
    }
}
