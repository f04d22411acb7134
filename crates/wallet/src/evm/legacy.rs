//! Deprecated provider methods.

use crate::macros::wallet_warn;
use headless_wallet_rpc::error::RpcError;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// How a deprecated method is answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegacyOutcome {
    /// Answer with a fixed value.
    Stub(Value),
    /// Fail with the given error.
    Reject(RpcError),
    /// Handle as the named replacement method.
    Redirect(&'static str),
}

const REMOVED_PREFIXES: &[(&str, &str)] = &[
    ("shh_", "Whisper (shh_*) methods were removed from the provider API"),
    ("db_", "LevelDB (db_*) methods were removed from the provider API"),
    ("eth_compile", "compiler methods were removed from the provider API"),
];

/// Answers deprecated methods and warns the first time each one is used.
#[derive(Debug, Default)]
pub struct LegacyShim {
    warned: Mutex<BTreeSet<String>>,
}

impl LegacyShim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `method` is deprecated, and how it's answered.
    pub fn classify(method: &str) -> Option<LegacyOutcome> {
        let outcome = match method {
            "eth_getCompilers" => LegacyOutcome::Stub(json!([])),
            "eth_mining" | "eth_submitWork" | "eth_submitHashrate" => {
                LegacyOutcome::Stub(json!(false))
            }
            "eth_hashrate" | "net_peerCount" => LegacyOutcome::Stub(json!("0x0")),
            "eth_getWork" => LegacyOutcome::Reject(RpcError::unsupported_method(
                "eth_getWork is not supported after the merge",
            )),
            "eth_decrypt" | "eth_getEncryptionPublicKey" => LegacyOutcome::Reject(
                RpcError::unsupported_method(format!("{method} has been deprecated")),
            ),
            "eth_signTypedData" | "eth_signTypedData_v1" => {
                LegacyOutcome::Reject(RpcError::unsupported_method(format!(
                    "{method} is deprecated, use eth_signTypedData_v4"
                )))
            }
            "eth_signTypedData_v3" => LegacyOutcome::Redirect("eth_signTypedData_v4"),
            _ => {
                let (_, reason) =
                    REMOVED_PREFIXES.iter().find(|(prefix, _)| method.starts_with(prefix))?;
                LegacyOutcome::Reject(RpcError::unsupported_method(format!("{method}: {reason}")))
            }
        };
        Some(outcome)
    }

    /// Classifies `method` and logs a deprecation warning the first time it's seen.
    pub fn handle(&self, method: &str) -> Option<LegacyOutcome> {
        let outcome = Self::classify(method)?;
        let hint = match &outcome {
            LegacyOutcome::Redirect(target) => format!("handled as {target}"),
            LegacyOutcome::Stub(value) => format!("answered with {value}"),
            LegacyOutcome::Reject(_) => "rejected".to_string(),
        };
        self.warn_once(method, &hint);
        Some(outcome)
    }

    /// Logs a deprecation warning unless one was already logged for `method`.
    pub fn warn_once(&self, method: &str, hint: &str) -> bool {
        if !self.warned.lock().insert(method.to_string()) {
            return false;
        }
        wallet_warn!("{method} is deprecated and {hint}");
        true
    }

    /// Methods a warning was logged for.
    pub fn warned(&self) -> Vec<String> {
        self.warned.lock().iter().cloned().collect()
    }
}
