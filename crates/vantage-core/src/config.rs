//! Engine configuration.
//!
//! The surrounding service loads this once at startup; everything here is
//! read-only afterward. [`VaConfig::validate`] runs before the engine
//! accepts requests, and an unsatisfiable configuration (for instance a
//! failure threshold larger than the remote VA set) refuses to start
//! rather than failing at request time.

use crate::error::{Result, VaError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the validation engine
#[derive(Debug, Clone, Deserialize)]
pub struct VaConfig {
    /// Issuer identity matched against CAA `issue`/`issuewild` values
    pub issuer_domain: String,

    /// User-Agent sent on outbound HTTP (challenge fetches, remote RPCs)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Fixed challenge ports
    #[serde(default)]
    pub ports: PortConfig,

    /// Resolver settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Distributed CAA resolver; absent means local-only CAA lookups
    pub cdr: Option<CdrConfig>,

    /// Remote validation authorities polled for corroboration
    #[serde(default, rename = "remote")]
    pub remotes: Vec<RemoteVaConfig>,

    /// Remote failures tolerated before the quorum fails.
    /// Must be satisfiable by the remote set size.
    #[serde(default)]
    pub max_remote_failures: usize,

    /// Connection/read deadline for one challenge proof check
    /// (milliseconds)
    #[serde(default = "default_challenge_timeout_ms")]
    pub challenge_timeout_ms: u64,

    /// Deadline for the whole remote fan-out (milliseconds)
    #[serde(default = "default_corroboration_timeout_ms")]
    pub corroboration_timeout_ms: u64,

    /// Deadline for one whole validation request (milliseconds)
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
}

/// Ports used by challenge proofs
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    /// Plain-HTTP proof port (HTTP-01)
    #[serde(default = "default_http_port")]
    pub http: u16,
    /// TLS proof port (TLS-ALPN-01)
    #[serde(default = "default_tls_port")]
    pub tls: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            http: default_http_port(),
            tls: default_tls_port(),
        }
    }
}

/// Resolver settings
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// Upstream resolver as `ip` or `ip:port`; system configuration when
    /// absent
    pub resolver: Option<String>,

    /// Per-attempt query timeout (milliseconds)
    #[serde(default = "default_dns_timeout_ms")]
    pub timeout_ms: u64,

    /// Times to try a query with a transient error before giving up.
    /// Values below 1 are clamped to 1, matching the long-standing
    /// behavior of zero meaning "one attempt".
    #[serde(default = "default_dns_tries")]
    pub tries: i64,

    /// Accept answers resolving to loopback/link-local addresses.
    /// Only for non-production test environments.
    #[serde(default)]
    pub allow_loopback: bool,

    /// File of domain names whose CAA SERVFAILs are treated as "no record"
    pub servfail_exceptions: Option<PathBuf>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolver: None,
            timeout_ms: default_dns_timeout_ms(),
            tries: default_dns_tries(),
            allow_loopback: false,
            servfail_exceptions: None,
        }
    }
}

impl DnsConfig {
    /// Per-attempt timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Effective try count, clamped to at least 1
    #[must_use]
    pub const fn tries(&self) -> u32 {
        if self.tries < 1 {
            1
        } else {
            self.tries as u32
        }
    }
}

/// How the distributed CAA resolver combines with the local resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CdrMode {
    /// Proxies replace the local resolver for CAA lookups
    #[default]
    Exclusive,
    /// Both run; both must authorize
    RequireAgreement,
}

/// Distributed CAA resolver settings
#[derive(Debug, Clone, Deserialize)]
pub struct CdrConfig {
    /// Proxy URLs, one per independent vantage point
    pub proxies: Vec<String>,

    /// Per-proxy query timeout (milliseconds)
    #[serde(default = "default_cdr_timeout_ms")]
    pub timeout_ms: u64,

    /// Proxies allowed to fail or disagree before the aggregate fails
    /// closed. Must be strictly below the proxy count.
    pub max_failures: usize,

    /// Precedence between distributed and local lookups
    #[serde(default)]
    pub mode: CdrMode,

    /// DoH endpoint queried through each proxy
    #[serde(default = "default_doh_endpoint")]
    pub resolver: String,
}

impl CdrConfig {
    /// Per-proxy timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One remote validation authority
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteVaConfig {
    /// Base URL of the peer's RPC endpoint
    pub url: String,
    /// Display label used in logs and failure records
    pub label: String,
}

impl VaConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VaError::Config(e.to_string()))
    }

    /// Check cross-field invariants. Violations are startup-fatal.
    pub fn validate(&self) -> Result<()> {
        if self.issuer_domain.trim().is_empty() {
            return Err(VaError::Config("issuer_domain must not be empty".into()));
        }
        if self.max_remote_failures > self.remotes.len() {
            return Err(VaError::Config(format!(
                "max_remote_failures ({}) exceeds remote VA set size ({})",
                self.max_remote_failures,
                self.remotes.len()
            )));
        }
        for remote in &self.remotes {
            url::Url::parse(&remote.url)
                .map_err(|e| VaError::Config(format!("remote VA url {}: {e}", remote.url)))?;
            if remote.label.trim().is_empty() {
                return Err(VaError::Config(format!(
                    "remote VA {} needs a display label",
                    remote.url
                )));
            }
        }
        if let Some(cdr) = &self.cdr {
            if cdr.proxies.is_empty() {
                return Err(VaError::Config(
                    "cdr.proxies must not be empty when [cdr] is configured".into(),
                ));
            }
            if cdr.max_failures >= cdr.proxies.len() {
                return Err(VaError::Config(format!(
                    "cdr.max_failures ({}) must be below the proxy count ({})",
                    cdr.max_failures,
                    cdr.proxies.len()
                )));
            }
            for proxy in &cdr.proxies {
                url::Url::parse(proxy)
                    .map_err(|e| VaError::Config(format!("cdr proxy {proxy}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Challenge proof deadline
    #[must_use]
    pub const fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }

    /// Remote fan-out deadline
    #[must_use]
    pub const fn corroboration_timeout(&self) -> Duration {
        Duration::from_millis(self.corroboration_timeout_ms)
    }

    /// Whole-request deadline
    #[must_use]
    pub const fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

// Default value functions for serde.
fn default_user_agent() -> String {
    format!("vantage-va/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_http_port() -> u16 {
    80
}

const fn default_tls_port() -> u16 {
    443
}

const fn default_dns_timeout_ms() -> u64 {
    1_000
}

const fn default_dns_tries() -> i64 {
    3
}

const fn default_cdr_timeout_ms() -> u64 {
    5_000
}

const fn default_challenge_timeout_ms() -> u64 {
    10_000
}

fn default_doh_endpoint() -> String {
    String::from("https://dns.google/resolve")
}

const fn default_corroboration_timeout_ms() -> u64 {
    10_000
}

const fn default_overall_timeout_ms() -> u64 {
    30_000
}
