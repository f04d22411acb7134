//! Wire format of the bridge.
//!
//! Both directions are JSON. The driver posts a [`BridgeMessage`], the page answers with a
//! [`BridgeResponse`] carrying the id of the message it answers.

use headless_wallet::{
    AccountInfo, ProviderInfo, WalletOptions, WalletUpdate, security::is_valid_security_token,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

/// Commands the page side understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    InstallWallet,
    RemoveWallet,
    UpdateConfig,
    GetState,
    CleanupAll,
    SecurityCheck,
    Heartbeat,
}

impl MessageType {
    pub const ALL: [Self; 7] = [
        Self::InstallWallet,
        Self::RemoveWallet,
        Self::UpdateConfig,
        Self::GetState,
        Self::CleanupAll,
        Self::SecurityCheck,
        Self::Heartbeat,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::InstallWallet => "install_wallet",
            Self::RemoveWallet => "remove_wallet",
            Self::UpdateConfig => "update_config",
            Self::GetState => "get_state",
            Self::CleanupAll => "cleanup_all",
            Self::SecurityCheck => "security_check",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| format!("unknown message type `{s}`"))
    }
}

/// A command sent from the driver to the page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: u64,
    pub session_id: String,
    pub security_token: String,
}

impl BridgeMessage {
    /// Validates the envelope shape of a raw message before anything is dispatched.
    ///
    /// The error carries the message id whenever one could be read, so the rejection can still
    /// be correlated by the driver.
    pub fn parse(raw: &str) -> Result<Self, MalformedEnvelope> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| MalformedEnvelope::new(None, format!("invalid JSON: {err}")))?;
        let Value::Object(object) = value else {
            return Err(MalformedEnvelope::new(None, "expected a JSON object"));
        };
        let id = non_empty(&object, "id").map_err(|reason| MalformedEnvelope::new(None, reason))?;
        let malformed = |reason: String| MalformedEnvelope::new(Some(id.clone()), reason);

        let message_type = non_empty(&object, "type")
            .map_err(malformed)?
            .parse::<MessageType>()
            .map_err(malformed)?;
        let session_id = non_empty(&object, "sessionId").map_err(malformed)?;
        let security_token = non_empty(&object, "securityToken").map_err(malformed)?;
        if !is_valid_security_token(&security_token) {
            return Err(malformed("invalid security token".to_string()));
        }
        let timestamp = object.get("timestamp").and_then(Value::as_u64).unwrap_or_default();
        let payload = object.get("payload").cloned().unwrap_or_default();

        Ok(Self { id, message_type, payload, timestamp, session_id, security_token })
    }
}

fn non_empty(object: &Map<String, Value>, field: &str) -> Result<String, String> {
    match object.get(field).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(format!("missing or empty `{field}`")),
    }
}

/// A message that failed envelope validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedEnvelope {
    pub id: Option<String>,
    pub reason: String,
}

impl MalformedEnvelope {
    fn new(id: Option<String>, reason: impl Into<String>) -> Self {
        Self { id, reason: reason.into() }
    }
}

/// `error` member of a failed [`BridgeResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub code: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { message: message.into(), code: code.into() }
    }
}

/// The page's answer to a [`BridgeMessage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(default)]
    pub timestamp: u64,
}

impl BridgeResponse {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), success: true, data: Some(data), error: None, timestamp: now_millis() }
    }

    pub fn err(id: impl Into<String>, error: ErrorPayload) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error),
            timestamp: now_millis(),
        }
    }

    /// The data of a successful response, the error payload otherwise.
    pub fn into_result(self) -> Result<Value, ErrorPayload> {
        if self.success {
            Ok(self.data.unwrap_or_default())
        } else {
            Err(self.error.unwrap_or_else(|| ErrorPayload::new("UNKNOWN", "request failed")))
        }
    }
}

/// `install_wallet` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallWalletPayload {
    pub instance_id: String,
    /// Replace an instance with the same id instead of failing.
    #[serde(default)]
    pub override_existing: bool,
    #[serde(flatten)]
    pub options: WalletOptions,
}

/// `install_wallet` result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallWalletResult {
    pub instance_id: String,
    pub info: ProviderInfo,
    pub accounts: Vec<AccountInfo>,
    /// Whether the instance replaced an existing one.
    #[serde(default)]
    pub replaced: bool,
}

/// Payload of every command that targets one instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePayload {
    pub instance_id: String,
}

/// `update_config` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigPayload {
    pub instance_id: String,
    #[serde(flatten)]
    pub update: WalletUpdate,
}

/// `cleanup_all` result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupAllResult {
    pub removed: Vec<String>,
}

/// `security_check` result, doubles as the handshake reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCheckResult {
    /// The session the page side dispatcher is bound to.
    pub session_id: String,
    pub origin: Option<String>,
    pub is_production: bool,
    pub confidence: f64,
    pub instances: usize,
}

/// `heartbeat` result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    pub received_at: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}
