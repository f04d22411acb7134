//! # headless-wallet-config
//!
//! Configuration for the simulated wallet, the message bridge and the security guard.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod error;
pub use error::ExtractConfigError;

// reexport so callers can merge their own providers
pub use figment;

/// Headless wallet configuration
///
/// # Defaults
///
/// All configuration values have a default, [`Config::default()`] returns them. [`Config::load()`]
/// starts with the defaults and merges, in order:
///
/// - the TOML file [`Config::FILE_NAME`] in the current directory, if present
/// - environment variables prefixed with [`Config::ENV_PREFIX`], nested keys are separated by
///   `__`, e.g. `HEADLESS_WALLET_BRIDGE__MESSAGE_TIMEOUT_MS=1000`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message bridge settings
    pub bridge: BridgeConfig,
    /// Security guard settings
    pub security: SecurityConfig,
    /// Defaults applied to newly installed wallets
    pub wallet: WalletDefaults,
}

impl Config {
    /// The name of the config file loaded by [`Config::load()`].
    pub const FILE_NAME: &'static str = "headless-wallet.toml";

    /// The prefix of environment variables merged into the config.
    pub const ENV_PREFIX: &'static str = "HEADLESS_WALLET_";

    /// Loads the config from the current working directory.
    ///
    /// See [`Config::figment()`] for the merged providers.
    pub fn load() -> Result<Self, ExtractConfigError> {
        Self::from_provider(Self::figment())
    }

    /// Loads the config using `root` as the directory containing [`Config::FILE_NAME`].
    pub fn load_with_root(root: impl AsRef<Path>) -> Result<Self, ExtractConfigError> {
        Self::from_provider(Self::figment_with_root(root))
    }

    /// Returns the default figment: defaults, `headless-wallet.toml` and env vars.
    pub fn figment() -> Figment {
        Self::figment_with_root(".")
    }

    /// Returns the default figment with [`Config::FILE_NAME`] resolved relative to `root`.
    pub fn figment_with_root(root: impl AsRef<Path>) -> Figment {
        let file: PathBuf = root.as_ref().join(Self::FILE_NAME);
        trace!(target: "config", ?file, "building config figment");
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// Extracts a `Config` from the given provider.
    ///
    /// ```rust
    /// use headless_wallet_config::{Config, figment::providers::{Format, Toml}};
    ///
    /// let figment = Config::figment().merge(Toml::string("[bridge]\nmessage_timeout_ms = 10"));
    /// let config = Config::from_provider(figment).unwrap();
    /// assert_eq!(config.bridge.message_timeout_ms, 10);
    /// ```
    pub fn from_provider<T: Provider>(provider: T) -> Result<Self, ExtractConfigError> {
        let figment = Figment::from(provider);
        let config = figment.extract::<Self>().map_err(ExtractConfigError::new)?;
        config.sanitized()
    }

    /// Validates value ranges that serde alone can't express.
    fn sanitized(self) -> Result<Self, ExtractConfigError> {
        let threshold = self.security.production_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ExtractConfigError::invalid_value(
                "security.production_confidence_threshold",
                format!("{threshold} is not within [0, 1]"),
            ));
        }
        if self.bridge.rate_limit.max_attempts == 0 {
            return Err(ExtractConfigError::invalid_value(
                "bridge.rate_limit.max_attempts",
                "must be greater than zero",
            ));
        }
        if self.bridge.max_message_size == 0 {
            return Err(ExtractConfigError::invalid_value(
                "bridge.max_message_size",
                "must be greater than zero",
            ));
        }
        Ok(self)
    }
}

/// Settings of the driver-side message bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a single bridge call waits for its reply.
    pub message_timeout_ms: u64,
    /// How long the `security_check` handshake waits for its reply.
    pub handshake_timeout_ms: u64,
    /// Upper bound of a serialized bridge message, in bytes.
    pub max_message_size: usize,
    /// Per session and message type rate limit.
    pub rate_limit: RateLimitConfig,
}

impl BridgeConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            message_timeout_ms: 5_000,
            handshake_timeout_ms: 2_000,
            max_message_size: 1024 * 1024,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Sliding window rate limit settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts allowed within one window.
    pub max_attempts: u32,
    /// Window length.
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_attempts: 10, window_ms: 60_000 }
    }
}

/// Settings of the security guard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Skip the production environment check entirely.
    pub allow_production: bool,
    /// Confidence at or above which the environment is treated as production.
    pub production_confidence_threshold: f64,
    /// Page origins an install is allowed from, empty allows every origin.
    pub allowed_origins: Vec<String>,
    /// Maximum number of concurrently installed wallet instances.
    pub max_instances: usize,
    /// Whether rpc urls may point at loopback hosts.
    pub allow_localhost: bool,
    /// Whether rpc urls may point at private network ranges.
    pub allow_private_networks: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_production: false,
            production_confidence_threshold: 0.7,
            allowed_origins: Vec::new(),
            max_instances: 10,
            allow_localhost: true,
            allow_private_networks: false,
        }
    }
}

/// Defaults applied to newly installed wallets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletDefaults {
    /// Chain the EVM provider starts on when the install request doesn't pick one.
    pub chain_id: String,
    /// Cluster the Solana provider starts on.
    pub cluster: String,
    /// Connect right after install.
    pub auto_connect: bool,
    /// Wallet name announced via EIP-6963 and the Wallet Standard.
    pub name: String,
    /// Reverse DNS identifier announced via EIP-6963.
    pub rdns: String,
    /// Data URI of the wallet icon.
    pub icon: String,
}

impl Default for WalletDefaults {
    fn default() -> Self {
        Self {
            chain_id: "0x1".to_string(),
            cluster: "devnet".to_string(),
            auto_connect: false,
            name: "Headless Wallet".to_string(),
            rdns: "dev.headless-wallet".to_string(),
            icon: "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAzMiAzMiI+PHJlY3Qgd2lkdGg9IjMyIiBoZWlnaHQ9IjMyIiByeD0iOCIvPjwvc3ZnPg==".to_string(),
        }
    }
}
