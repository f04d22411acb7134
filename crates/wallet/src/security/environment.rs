//! Heuristic production environment detection.

use serde::Serialize;
use std::collections::BTreeMap;
use url::{Host, Url};

/// Environment variables naming the deployment stage.
const STAGE_VARS: &[&str] = &["NODE_ENV", "APP_ENV", "RUST_ENV", "ENVIRONMENT"];

/// Environment variables set by CI providers.
const CI_VARS: &[&str] =
    &["CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE", "CIRCLECI", "JENKINS_URL", "TF_BUILD"];

/// Environment variables set by test runners and browser automation.
const TEST_RUNNER_VARS: &[&str] = &[
    "PLAYWRIGHT_TEST_BASE_URL",
    "PLAYWRIGHT_BROWSERS_PATH",
    "JEST_WORKER_ID",
    "VITEST",
    "CYPRESS",
    "NEXTEST",
    "RUST_TEST_THREADS",
    "HEADLESS_WALLET_TEST",
];

/// The inputs the detector scores.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
    page_url: Option<Url>,
}

impl EnvironmentSnapshot {
    /// Captures the relevant variables of the current process.
    pub fn from_process() -> Self {
        let vars = STAGE_VARS
            .iter()
            .chain(CI_VARS)
            .chain(TEST_RUNNER_VARS)
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { vars, page_url: None }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_page_url(mut self, url: Url) -> Self {
        self.page_url = Some(url);
        self
    }

    pub fn page_url(&self) -> Option<&Url> {
        self.page_url.as_ref()
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|value| !value.is_empty())
    }
}

/// A single piece of evidence found by the detector.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Signal {
    ProductionStage { var: String, value: String },
    DevelopmentStage { var: String, value: String },
    ContinuousIntegration { var: String },
    TestRunner { var: String },
    LocalOrigin { host: String },
    StagingOrigin { host: String },
    PublicOrigin { host: String, secure: bool },
}

impl Signal {
    /// Score contribution, positive values point towards production.
    fn weight(&self) -> f64 {
        match self {
            Self::ProductionStage { .. } => 0.6,
            Self::DevelopmentStage { .. } => -0.4,
            Self::ContinuousIntegration { .. } => -0.3,
            Self::TestRunner { .. } => -0.3,
            Self::LocalOrigin { .. } => -0.3,
            Self::StagingOrigin { .. } => -0.1,
            Self::PublicOrigin { secure: true, .. } => 0.3,
            Self::PublicOrigin { secure: false, .. } => 0.1,
        }
    }
}

/// Outcome of [`EnvironmentDetector::assess`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentAssessment {
    pub is_production: bool,
    /// Production likelihood in `[0, 1]`.
    pub confidence: f64,
    pub signals: Vec<Signal>,
}

/// Scores an [`EnvironmentSnapshot`] and flags it as production once the confidence reaches the
/// threshold.
#[derive(Clone, Copy, Debug)]
pub struct EnvironmentDetector {
    threshold: f64,
}

impl Default for EnvironmentDetector {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

impl EnvironmentDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0) }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn assess(&self, snapshot: &EnvironmentSnapshot) -> EnvironmentAssessment {
        let mut signals = Vec::new();

        for var in STAGE_VARS {
            let Some(value) = snapshot.var(var) else { continue };
            let signal = match value.to_ascii_lowercase().as_str() {
                "production" | "prod" => {
                    Signal::ProductionStage { var: var.to_string(), value: value.to_string() }
                }
                "development" | "dev" | "test" | "testing" => {
                    Signal::DevelopmentStage { var: var.to_string(), value: value.to_string() }
                }
                _ => continue,
            };
            signals.push(signal);
            // the first stage variable wins
            break;
        }

        if let Some(var) = CI_VARS.iter().find(|var| snapshot.var(var).is_some_and(is_truthy)) {
            signals.push(Signal::ContinuousIntegration { var: var.to_string() });
        }
        if let Some(var) = TEST_RUNNER_VARS.iter().find(|var| snapshot.var(var).is_some()) {
            signals.push(Signal::TestRunner { var: var.to_string() });
        }
        if let Some(url) = snapshot.page_url() {
            signals.extend(origin_signal(url));
        }

        let confidence = signals.iter().map(Signal::weight).sum::<f64>().clamp(0.0, 1.0);
        let is_production = confidence >= self.threshold && confidence > 0.0;
        trace!(target: "wallet::security", confidence, is_production, ?signals, "assessed environment");
        EnvironmentAssessment { is_production, confidence, signals }
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

fn origin_signal(url: &Url) -> Option<Signal> {
    if url.scheme() == "file" {
        return Some(Signal::LocalOrigin { host: String::new() });
    }
    let host = url.host()?;
    let name = host.to_string();
    let is_local = match &host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || [".localhost", ".local", ".test", ".internal"]
                    .iter()
                    .any(|suffix| domain.ends_with(suffix))
        }
        Host::Ipv4(ip) => ip.is_loopback() || ip.is_private() || ip.is_unspecified(),
        Host::Ipv6(ip) => ip.is_loopback() || ip.is_unspecified(),
    };
    if is_local {
        return Some(Signal::LocalOrigin { host: name });
    }
    if let Host::Domain(domain) = &host {
        let domain = domain.to_ascii_lowercase();
        if ["staging", "preview", "dev."].iter().any(|marker| domain.contains(marker)) {
            return Some(Signal::StagingOrigin { host: name });
        }
    }
    Some(Signal::PublicOrigin { host: name, secure: url.scheme() == "https" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn production_stage_on_public_https_is_production() {
        let snapshot = EnvironmentSnapshot::default()
            .with_var("NODE_ENV", "production")
            .with_page_url(url("https://app.example.com"));
        let assessment = EnvironmentDetector::default().assess(&snapshot);
        assert!(assessment.is_production);
        assert!((assessment.confidence - 0.9).abs() < 1e-9);
        assert_eq!(assessment.signals.len(), 2);
    }

    #[test]
    fn production_stage_alone_stays_below_threshold() {
        let snapshot = EnvironmentSnapshot::default().with_var("NODE_ENV", "production");
        let assessment = EnvironmentDetector::default().assess(&snapshot);
        assert!(!assessment.is_production);
        assert!(EnvironmentDetector::new(0.5).assess(&snapshot).is_production);
    }

    #[test]
    fn test_runner_on_localhost_is_not_production() {
        let snapshot = EnvironmentSnapshot::default()
            .with_var("NODE_ENV", "production")
            .with_var("PLAYWRIGHT_TEST_BASE_URL", "http://localhost:3000")
            .with_var("CI", "true")
            .with_page_url(url("http://localhost:3000/app"));
        let assessment = EnvironmentDetector::default().assess(&snapshot);
        assert!(!assessment.is_production);
        assert_eq!(assessment.confidence, 0.0);
    }

    #[test]
    fn empty_environment_is_never_production() {
        let assessment = EnvironmentDetector::new(0.0).assess(&EnvironmentSnapshot::default());
        assert!(!assessment.is_production);
        assert!(assessment.signals.is_empty());
    }

    #[test]
    fn classifies_origins() {
        assert!(matches!(origin_signal(&url("http://127.0.0.1:8545")), Some(Signal::LocalOrigin { .. })));
        assert!(matches!(origin_signal(&url("https://dapp.local")), Some(Signal::LocalOrigin { .. })));
        assert!(matches!(
            origin_signal(&url("https://staging.example.com")),
            Some(Signal::StagingOrigin { .. })
        ));
        assert_eq!(
            origin_signal(&url("http://example.com")),
            Some(Signal::PublicOrigin { host: "example.com".to_string(), secure: false })
        );
    }
}
