//! Guards that keep the simulated wallet out of production pages.

use headless_wallet_config::SecurityConfig;
use headless_wallet_rpc::error::RpcError;
use url::Url;

pub mod environment;
pub mod memory;
pub mod network;

pub use environment::{EnvironmentAssessment, EnvironmentDetector, EnvironmentSnapshot, Signal};
pub use memory::{SecretBytes, constant_time_eq, is_valid_security_token, random_hex};
pub use network::{BlockReason, NetworkValidator};

/// A refused operation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SecurityViolation {
    #[error("refusing to run in a production environment (confidence {confidence:.2})")]
    ProductionEnvironment { confidence: f64 },
    #[error("origin `{0}` is not allowed")]
    DisallowedOrigin(String),
    #[error("instance limit of {max} reached")]
    InstanceLimitExceeded { max: usize },
    #[error("blocked url `{url}`: {reason}")]
    BlockedUrl { url: String, reason: BlockReason },
    #[error("invalid security token")]
    InvalidSecurityToken,
}

impl From<SecurityViolation> for RpcError {
    fn from(err: SecurityViolation) -> Self {
        match err {
            err @ SecurityViolation::BlockedUrl { .. } => Self::invalid_params(err.to_string()),
            err => Self::unauthorized(err.to_string()),
        }
    }
}

/// Combines the environment, origin, capacity and url checks under one configuration.
#[derive(Clone, Debug)]
pub struct SecurityGuard {
    detector: EnvironmentDetector,
    network: NetworkValidator,
    allow_production: bool,
    allowed_origins: Vec<String>,
    max_instances: usize,
}

impl Default for SecurityGuard {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

impl SecurityGuard {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            detector: EnvironmentDetector::new(config.production_confidence_threshold),
            network: NetworkValidator::new(config.allow_localhost, config.allow_private_networks),
            allow_production: config.allow_production,
            allowed_origins: config
                .allowed_origins
                .iter()
                .map(|origin| normalize_origin(origin).unwrap_or_else(|| origin.clone()))
                .collect(),
            max_instances: config.max_instances,
        }
    }

    pub fn network(&self) -> &NetworkValidator {
        &self.network
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Fails if the snapshot looks like production, unless production use was explicitly allowed.
    pub fn ensure_not_production(
        &self,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<EnvironmentAssessment, SecurityViolation> {
        let assessment = self.detector.assess(snapshot);
        if assessment.is_production && !self.allow_production {
            warn!(target: "wallet::security", confidence = assessment.confidence, "production environment detected");
            return Err(SecurityViolation::ProductionEnvironment {
                confidence: assessment.confidence,
            });
        }
        Ok(assessment)
    }

    /// Checks the page origin against the allowlist. An empty allowlist allows everything.
    pub fn check_origin(&self, origin: &str) -> Result<(), SecurityViolation> {
        if self.allowed_origins.is_empty() {
            return Ok(());
        }
        let normalized = normalize_origin(origin).unwrap_or_else(|| origin.to_string());
        if self.allowed_origins.iter().any(|allowed| allowed == &normalized) {
            Ok(())
        } else {
            Err(SecurityViolation::DisallowedOrigin(origin.to_string()))
        }
    }

    /// Fails if another instance would exceed the limit.
    pub fn check_capacity(&self, installed: usize) -> Result<(), SecurityViolation> {
        if installed >= self.max_instances {
            return Err(SecurityViolation::InstanceLimitExceeded { max: self.max_instances });
        }
        Ok(())
    }

    pub fn validate_url(&self, url: &str) -> Result<Url, SecurityViolation> {
        self.network.validate(url)
    }
}

/// `scheme://host[:port]` of `raw`, `None` for opaque or unparseable origins.
pub fn normalize_origin(raw: &str) -> Option<String> {
    let origin = Url::parse(raw).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
