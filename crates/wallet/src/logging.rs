//! User facing wallet logs

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{Metadata, subscriber::Interest};
use tracing_subscriber::{Layer, layer::Context};

/// The target that identifies the events intended to be displayed to the test author.
pub const WALLET_USER_LOG_TARGET: &str = "headless_wallet::user";

/// A logger that listens for the logs of the [`WALLET_USER_LOG_TARGET`] target and only emits them
/// while the [`LoggingManager`] is enabled. Every other target passes through.
#[derive(Clone, Debug, Default)]
pub struct WalletLogLayer {
    state: LoggingManager,
}

impl WalletLogLayer {
    /// Returns a new instance of this layer
    pub fn new(state: LoggingManager) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for WalletLogLayer
where
    S: tracing::Subscriber,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        if metadata.target() == WALLET_USER_LOG_TARGET {
            Interest::sometimes()
        } else {
            Interest::always()
        }
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        if metadata.target() == WALLET_USER_LOG_TARGET { self.state.is_enabled() } else { true }
    }
}

/// Contains the configuration of the user facing logger
#[derive(Clone, Debug)]
pub struct LoggingManager {
    /// Whether the logger is currently enabled
    pub enabled: Arc<RwLock<bool>>,
}

impl LoggingManager {
    /// Returns true if logging is currently enabled
    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    /// Updates the `enabled` state
    pub fn set_enabled(&self, enabled: bool) {
        let mut current = self.enabled.write();
        *current = enabled;
    }
}

impl Default for LoggingManager {
    fn default() -> Self {
        Self { enabled: Arc::new(RwLock::new(true)) }
    }
}
