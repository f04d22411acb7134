//! Page side of the bridge: validates incoming messages and routes them to the wallet instances
//! of a [`Window`].

use crate::{
    message::{
        BridgeMessage, BridgeResponse, CleanupAllResult, ErrorPayload, HeartbeatResult,
        InstallWalletPayload, InstallWalletResult, InstancePayload, MessageType,
        SecurityCheckResult, UpdateConfigPayload, now_millis,
    },
    realm::Window,
    session::SessionCredentials,
};
use headless_wallet::{HeadlessWallet, SecurityGuard, SecurityViolation, ValidationError};
use headless_wallet_config::{SecurityConfig, WalletDefaults};
use headless_wallet_rpc::error::RpcError;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("session id or security token mismatch")]
    Unauthorized,
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Security(#[from] SecurityViolation),
    #[error(transparent)]
    Provider(#[from] RpcError),
    #[error("a wallet instance with id `{0}` is already installed")]
    InstanceExists(String),
    #[error("no wallet instance with id `{0}` is installed")]
    InstanceNotFound(String),
}

impl DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_MESSAGE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Security(_) => "SECURITY_VIOLATION",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::InstanceExists(_) => "INSTANCE_EXISTS",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
        }
    }

    fn into_payload(self) -> ErrorPayload {
        ErrorPayload::new(self.code(), self.to_string())
    }
}

/// `window.__walletMockBridge`: the dispatcher bound to one bridge session.
#[derive(Debug)]
pub struct PageDispatcher {
    credentials: SessionCredentials,
    guard: SecurityGuard,
    defaults: WalletDefaults,
}

impl PageDispatcher {
    pub fn new(
        credentials: SessionCredentials,
        security: &SecurityConfig,
        defaults: WalletDefaults,
    ) -> Self {
        Self { credentials, guard: SecurityGuard::new(security), defaults }
    }

    pub fn session_id(&self) -> &str {
        &self.credentials.session_id
    }

    /// Handles one raw message and returns the reply.
    ///
    /// Messages without a readable id can't be answered and yield `None`.
    pub fn handle(&self, window: &Window, raw: &str) -> Option<BridgeResponse> {
        let message = match BridgeMessage::parse(raw) {
            Ok(message) => message,
            Err(malformed) => {
                warn!(target: "bridge::page", reason = %malformed.reason, "rejected malformed message");
                let id = malformed.id?;
                return Some(BridgeResponse::err(
                    id,
                    DispatchError::Malformed(malformed.reason).into_payload(),
                ));
            }
        };
        let id = message.id.clone();
        let message_type = message.message_type;
        trace!(target: "bridge::page", %id, %message_type, "dispatching");

        let response = match self.dispatch(window, message) {
            Ok(data) => BridgeResponse::ok(id, data),
            Err(err) => {
                debug!(target: "bridge::page", %message_type, %err, "command failed");
                BridgeResponse::err(id, err.into_payload())
            }
        };
        Some(response)
    }

    fn dispatch(&self, window: &Window, message: BridgeMessage) -> Result<Value, DispatchError> {
        if !self.credentials.matches(&message.session_id, &message.security_token) {
            return Err(DispatchError::Unauthorized);
        }
        match message.message_type {
            MessageType::InstallWallet => to_value(self.install_wallet(window, parse(message.payload)?)?),
            MessageType::RemoveWallet => {
                let InstancePayload { instance_id } = parse(message.payload)?;
                let wallet = window
                    .remove_instance(&instance_id)
                    .ok_or(DispatchError::InstanceNotFound(instance_id))?;
                wallet.teardown(window.events());
                Ok(Value::Bool(true))
            }
            MessageType::UpdateConfig => {
                let UpdateConfigPayload { instance_id, update } = parse(message.payload)?;
                let wallet = self.instance(window, instance_id)?;
                wallet.apply(&update)?;
                to_value(wallet.snapshot())
            }
            MessageType::GetState => {
                let InstancePayload { instance_id } = parse(message.payload)?;
                to_value(self.instance(window, instance_id)?.snapshot())
            }
            MessageType::CleanupAll => {
                let removed = window
                    .drain_instances()
                    .into_iter()
                    .map(|(id, wallet)| {
                        wallet.teardown(window.events());
                        id
                    })
                    .collect();
                to_value(CleanupAllResult { removed })
            }
            MessageType::SecurityCheck => {
                let assessment = self.guard.ensure_not_production(window.environment())?;
                to_value(SecurityCheckResult {
                    session_id: self.credentials.session_id.clone(),
                    origin: Some(window.origin()),
                    is_production: assessment.is_production,
                    confidence: assessment.confidence,
                    instances: window.instance_count(),
                })
            }
            MessageType::Heartbeat => to_value(HeartbeatResult { received_at: now_millis() }),
        }
    }

    /// Builds and exposes a wallet. Nothing is exposed unless every step succeeded.
    fn install_wallet(
        &self,
        window: &Window,
        payload: InstallWalletPayload,
    ) -> Result<InstallWalletResult, DispatchError> {
        let InstallWalletPayload { instance_id, override_existing, options } = payload;
        if instance_id.trim().is_empty() {
            return Err(DispatchError::Malformed("empty instanceId".to_string()));
        }
        self.guard.check_origin(&window.origin())?;
        self.guard.ensure_not_production(window.environment())?;

        let exists = window.instance(&instance_id).is_some();
        if exists && !override_existing {
            return Err(DispatchError::InstanceExists(instance_id));
        }
        self.guard.check_capacity(window.instance_count() - usize::from(exists))?;

        let wallet = Arc::new(HeadlessWallet::new(&options, &self.defaults, self.guard.network().clone())?);
        if let Err(err) = wallet.install(window.events()) {
            wallet.teardown(window.events());
            return Err(err.into());
        }

        let result = InstallWalletResult {
            instance_id: instance_id.clone(),
            info: wallet.info().clone(),
            accounts: wallet.accounts(),
            replaced: exists,
        };
        if let Some(replaced) = window.insert_instance(instance_id, wallet) {
            replaced.teardown(window.events());
        }
        debug!(target: "bridge::page", instance_id = %result.instance_id, replaced = result.replaced, "installed wallet");
        Ok(result)
    }

    fn instance(&self, window: &Window, id: String) -> Result<Arc<HeadlessWallet>, DispatchError> {
        window.instance(&id).ok_or(DispatchError::InstanceNotFound(id))
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, DispatchError> {
    Ok(serde_json::from_value(payload)?)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, DispatchError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use headless_wallet::security::EnvironmentSnapshot;
    use serde_json::json;
    use url::Url;

    fn setup_at(
        url: &str,
        security: SecurityConfig,
        environment: EnvironmentSnapshot,
    ) -> (PageDispatcher, Window) {
        let dispatcher =
            PageDispatcher::new(SessionCredentials::random(), &security, WalletDefaults::default());
        (dispatcher, Window::new(Url::parse(url).unwrap(), environment))
    }

    fn setup(security: SecurityConfig, environment: EnvironmentSnapshot) -> (PageDispatcher, Window) {
        setup_at("http://localhost:5173", security, environment)
    }

    fn message(dispatcher: &PageDispatcher, id: &str, ty: &str, payload: Value) -> String {
        json!({
            "id": id,
            "type": ty,
            "payload": payload,
            "timestamp": 0,
            "sessionId": dispatcher.credentials.session_id,
            "securityToken": dispatcher.credentials.security_token,
        })
        .to_string()
    }

    fn call(dispatcher: &PageDispatcher, window: &Window, ty: &str, payload: Value) -> BridgeResponse {
        dispatcher.handle(window, &message(dispatcher, "m", ty, payload)).unwrap()
    }

    #[test]
    fn install_update_remove() {
        let (dispatcher, window) = setup(SecurityConfig::default(), EnvironmentSnapshot::default());
        let installed = call(
            &dispatcher,
            &window,
            "install_wallet",
            json!({"instanceId": "w", "accounts": [{"type": "evm_only"}], "autoConnect": true}),
        );
        assert!(installed.success, "{installed:?}");
        assert!(window.ethereum().unwrap().is_connected());

        let duplicate = call(&dispatcher, &window, "install_wallet", json!({"instanceId": "w"}));
        assert_eq!(duplicate.error.unwrap().code, "INSTANCE_EXISTS");

        let updated =
            call(&dispatcher, &window, "update_config", json!({"instanceId": "w", "chainId": "0x89"}));
        assert_eq!(updated.data.unwrap()["evm"]["chainId"], "0x89");

        let removed = call(&dispatcher, &window, "remove_wallet", json!({"instanceId": "w"}));
        assert!(removed.success);
        assert!(window.ethereum().is_none());
        let missing = call(&dispatcher, &window, "get_state", json!({"instanceId": "w"}));
        assert_eq!(missing.error.unwrap().code, "INSTANCE_NOT_FOUND");
    }

    #[test]
    fn failed_install_leaves_no_globals() {
        let (dispatcher, window) = setup(SecurityConfig::default(), EnvironmentSnapshot::default());
        let response = call(
            &dispatcher,
            &window,
            "install_wallet",
            json!({"instanceId": "w", "accounts": [{"type": "evm_only", "evm": {"chainIds": ["zero"]}}]}),
        );
        assert_eq!(response.error.unwrap().code, "VALIDATION_ERROR");
        assert!(window.ethereum().is_none());
        assert_eq!(window.instance_count(), 0);
    }

    #[test]
    fn enforces_security() {
        let security = SecurityConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..Default::default()
        };
        let (dispatcher, window) = setup(security, EnvironmentSnapshot::default());
        let response = call(&dispatcher, &window, "install_wallet", json!({"instanceId": "w"}));
        assert_eq!(response.error.unwrap().code, "SECURITY_VIOLATION");

        let production = EnvironmentSnapshot::default().with_var("NODE_ENV", "production");
        let (dispatcher, window) =
            setup_at("https://app.example.com", SecurityConfig::default(), production);
        let response = call(&dispatcher, &window, "security_check", json!({}));
        assert_eq!(response.error.unwrap().code, "SECURITY_VIOLATION");
    }

    #[test]
    fn rejects_foreign_sessions() {
        let (dispatcher, window) = setup(SecurityConfig::default(), EnvironmentSnapshot::default());
        let other = PageDispatcher::new(
            SessionCredentials::random(),
            &SecurityConfig::default(),
            WalletDefaults::default(),
        );
        let response = dispatcher.handle(&window, &message(&other, "x", "heartbeat", json!({}))).unwrap();
        assert_eq!(response.id, "x");
        assert_eq!(response.error.unwrap().code, "UNAUTHORIZED");

        assert!(dispatcher.handle(&window, "not json").is_none());
        let response = dispatcher
            .handle(&window, &json!({"id": "y", "type": "heartbeat"}).to_string())
            .unwrap();
        assert_eq!(response.error.unwrap().code, "MALFORMED_MESSAGE");
    }

    #[test]
    fn security_check_reports_session() {
        let (dispatcher, window) = setup(SecurityConfig::default(), EnvironmentSnapshot::default());
        let response = call(&dispatcher, &window, "security_check", json!({}));
        let result: SecurityCheckResult = serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(result.session_id, dispatcher.session_id());
        assert_eq!(result.origin.as_deref(), Some("http://localhost:5173"));
        assert!(!result.is_production);
    }
}
