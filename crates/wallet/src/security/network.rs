//! Validation of rpc urls handed to the wallet.

use super::SecurityViolation;
use serde::Serialize;
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};
use url::{Host, Url};

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Hosts serving cloud instance metadata.
const METADATA_HOSTS: &[&str] = &["metadata.google.internal", "metadata.azure.com"];
const METADATA_IP: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// Why a url was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockReason {
    Unparseable,
    ScriptScheme,
    DisallowedScheme,
    EmbeddedCredentials,
    HeaderInjection,
    PathTraversal,
    MetadataEndpoint,
    Loopback,
    PrivateNetwork,
    LinkLocal,
    UnspecifiedAddress,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Unparseable => "not a valid url",
            Self::ScriptScheme => "script, data and file urls are not allowed",
            Self::DisallowedScheme => "only http(s) and ws(s) urls are allowed",
            Self::EmbeddedCredentials => "urls must not embed credentials",
            Self::HeaderInjection => "urls must not contain line breaks",
            Self::PathTraversal => "urls must not contain path traversal sequences",
            Self::MetadataEndpoint => "cloud metadata endpoints are not allowed",
            Self::Loopback => "loopback hosts are not allowed",
            Self::PrivateNetwork => "private network hosts are not allowed",
            Self::LinkLocal => "link-local hosts are not allowed",
            Self::UnspecifiedAddress => "unspecified addresses are not allowed",
        };
        f.write_str(reason)
    }
}

/// Rejects rpc urls that could be used to reach things a test page should not reach.
#[derive(Clone, Copy, Debug)]
pub struct NetworkValidator {
    allow_localhost: bool,
    allow_private_networks: bool,
}

impl Default for NetworkValidator {
    fn default() -> Self {
        Self { allow_localhost: true, allow_private_networks: false }
    }
}

impl NetworkValidator {
    pub fn new(allow_localhost: bool, allow_private_networks: bool) -> Self {
        Self { allow_localhost, allow_private_networks }
    }

    /// Parses and checks `raw`, returning the parsed url if it's acceptable.
    pub fn validate(&self, raw: &str) -> Result<Url, SecurityViolation> {
        self.check(raw).map_err(|reason| {
            debug!(target: "wallet::security", url = raw, %reason, "blocked url");
            SecurityViolation::BlockedUrl { url: raw.to_string(), reason }
        })
    }

    fn check(&self, raw: &str) -> Result<Url, BlockReason> {
        let lower = raw.trim().to_ascii_lowercase();
        if ["javascript:", "vbscript:", "data:", "file:"].iter().any(|p| lower.starts_with(p)) {
            return Err(BlockReason::ScriptScheme);
        }
        if ['\r', '\n'].iter().any(|c| raw.contains(*c))
            || ["%0d", "%0a"].iter().any(|p| lower.contains(p))
        {
            return Err(BlockReason::HeaderInjection);
        }
        // checked on the raw input, parsing resolves `..` segments
        if ["../", "..\\", "..%2f", "%2e%2e"].iter().any(|p| lower.contains(p)) {
            return Err(BlockReason::PathTraversal);
        }

        let url = Url::parse(raw.trim()).map_err(|_| BlockReason::Unparseable)?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(BlockReason::DisallowedScheme);
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(BlockReason::EmbeddedCredentials);
        }

        match url.host().ok_or(BlockReason::Unparseable)? {
            Host::Domain(domain) => {
                let domain = domain.to_ascii_lowercase();
                if METADATA_HOSTS.contains(&domain.as_str()) {
                    return Err(BlockReason::MetadataEndpoint);
                }
                if (domain == "localhost" || domain.ends_with(".localhost")) && !self.allow_localhost
                {
                    return Err(BlockReason::Loopback);
                }
            }
            Host::Ipv4(ip) => self.check_ipv4(ip)?,
            Host::Ipv6(ip) => self.check_ipv6(ip)?,
        }
        Ok(url)
    }

    fn check_ipv4(&self, ip: Ipv4Addr) -> Result<(), BlockReason> {
        if ip == METADATA_IP {
            return Err(BlockReason::MetadataEndpoint);
        }
        if ip.is_unspecified() || ip.is_broadcast() {
            return Err(BlockReason::UnspecifiedAddress);
        }
        if ip.is_link_local() {
            return Err(BlockReason::LinkLocal);
        }
        if ip.is_loopback() && !self.allow_localhost {
            return Err(BlockReason::Loopback);
        }
        if ip.is_private() && !self.allow_private_networks {
            return Err(BlockReason::PrivateNetwork);
        }
        Ok(())
    }

    fn check_ipv6(&self, ip: Ipv6Addr) -> Result<(), BlockReason> {
        if let Some(ip) = ip.to_ipv4_mapped() {
            return self.check_ipv4(ip);
        }
        if ip.is_unspecified() {
            return Err(BlockReason::UnspecifiedAddress);
        }
        if ip.is_loopback() && !self.allow_localhost {
            return Err(BlockReason::Loopback);
        }
        let first = ip.segments()[0];
        // fe80::/10
        if first & 0xffc0 == 0xfe80 {
            return Err(BlockReason::LinkLocal);
        }
        // fc00::/7
        if first & 0xfe00 == 0xfc00 && !self.allow_private_networks {
            return Err(BlockReason::PrivateNetwork);
        }
        Ok(())
    }
}
