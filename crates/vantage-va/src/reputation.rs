//! Malware/phishing reputation gate.
//!
//! The verdict provider is an external oracle. Provider failures must not
//! block issuance, so they surface as [`ReputationVerdict::Unknown`] and
//! the orchestrator's fail-open policy decides what to do with that; every
//! outcome is logged for audit either way.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use vantage_core::{Result, VaError};

/// Tri-state answer from the reputation provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReputationVerdict {
    /// The domain is a known malware/phishing target
    Blocked {
        /// Provider's reason, surfaced to the caller
        reason: String,
    },
    /// The provider affirmatively cleared the domain
    Clear,
    /// The provider could not answer
    Unknown {
        /// What went wrong, recorded for audit
        detail: String,
    },
}

/// Reputation capability consumed by the orchestrator
#[async_trait]
pub trait DomainReputation: Send + Sync {
    /// Ask the provider about a domain
    async fn check(&self, domain: &str) -> ReputationVerdict;
}

/// Gate used when no provider is configured; everything is clear
pub struct DisabledReputation;

#[async_trait]
impl DomainReputation for DisabledReputation {
    async fn check(&self, _domain: &str) -> ReputationVerdict {
        ReputationVerdict::Clear
    }
}

#[derive(Debug, Deserialize)]
struct ProviderAnswer {
    blocked: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP client for a boolean-verdict reputation provider
pub struct HttpReputation {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpReputation {
    /// Build a client for the provider at `endpoint`
    pub fn new(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| VaError::Config(format!("reputation client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DomainReputation for HttpReputation {
    async fn check(&self, domain: &str) -> ReputationVerdict {
        let response = match self
            .http
            .get(&self.endpoint)
            .query(&[("domain", domain)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let detail = format!("reputation provider unreachable: {e}");
                warn!(domain, detail, "reputation check inconclusive");
                return ReputationVerdict::Unknown { detail };
            }
        };

        if !response.status().is_success() {
            let detail = format!("reputation provider answered HTTP {}", response.status());
            warn!(domain, detail, "reputation check inconclusive");
            return ReputationVerdict::Unknown { detail };
        }

        match response.json::<ProviderAnswer>().await {
            Ok(answer) if answer.blocked => {
                let reason = answer
                    .reason
                    .unwrap_or_else(|| "domain is on the blocklist".to_string());
                warn!(domain, reason, "domain blocked by reputation provider");
                ReputationVerdict::Blocked { reason }
            }
            Ok(_) => {
                debug!(domain, "reputation clear");
                ReputationVerdict::Clear
            }
            Err(e) => {
                let detail = format!("unparseable reputation answer: {e}");
                warn!(domain, detail, "reputation check inconclusive");
                ReputationVerdict::Unknown { detail }
            }
        }
    }
}
