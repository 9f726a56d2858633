//! Remote validation authority clients.
//!
//! Each remote VA independently repeats the local checks from its own
//! network position. The clients here are long-lived and shared read-only
//! across requests; a peer that errors, times out, or is unreachable
//! always comes back as an explicit failure outcome, never a silent
//! omission.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;
use vantage_core::{
    ChallengeOutcome, Problem, RemoteVaConfig, Result, ValidationRequest, VaError,
};

/// RPC path a peer exposes for validation requests
pub const RPC_PATH: &str = "/rpc/perform-validation";

/// Wire answer from a remote perspective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteValidationResponse {
    /// Whether the peer's checks passed
    pub success: bool,
    /// Failure detail when they did not
    #[serde(default)]
    pub problem: Option<Problem>,
}

/// One peer validation authority
pub struct RemoteVa {
    label: String,
    endpoint: String,
    http: reqwest::Client,
}

impl RemoteVa {
    /// Build the long-lived client for one peer
    pub fn new(config: &RemoteVaConfig, user_agent: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(&config.url)
            .map_err(|e| VaError::Config(format!("remote VA url {}: {e}", config.url)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| VaError::Config(format!("remote VA client {}: {e}", config.label)))?;
        Ok(Self {
            label: config.label.clone(),
            endpoint: format!("{}{RPC_PATH}", config.url.trim_end_matches('/')),
            http,
        })
    }

    /// Display label used in logs and failure records
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ask this peer to repeat the validation
    pub async fn validate(&self, req: &ValidationRequest) -> ChallengeOutcome {
        let started = Instant::now();
        let outcome = match self.call(req).await {
            Ok(()) => ChallengeOutcome::pass(self.label.clone(), started.elapsed()),
            Err(problem) => ChallengeOutcome::fail(self.label.clone(), problem, started.elapsed()),
        };
        debug!(
            perspective = %self.label,
            success = outcome.success,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "remote validation outcome"
        );
        outcome
    }

    async fn call(&self, req: &ValidationRequest) -> std::result::Result<(), Problem> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Problem::connection("remote perspective timed out".to_string())
                } else {
                    Problem::connection(format!("remote perspective unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Problem::connection(format!(
                "remote perspective answered HTTP {status}"
            )));
        }

        let body: RemoteValidationResponse = response
            .json()
            .await
            .map_err(|e| Problem::connection(format!("unparseable remote answer: {e}")))?;

        if body.success {
            Ok(())
        } else {
            Err(body.problem.unwrap_or_else(|| {
                Problem::internal("remote perspective reported failure without detail")
            }))
        }
    }
}

/// Fan the request out to every peer under one corroboration deadline.
///
/// The result always holds exactly one outcome per configured peer:
/// successes, explicit failures, and deadline expiries counted as
/// failures.
pub async fn corroborate(
    remotes: &[RemoteVa],
    req: &ValidationRequest,
    deadline: Duration,
) -> Vec<ChallengeOutcome> {
    let calls = remotes.iter().map(|remote| async move {
        match timeout(deadline, remote.validate(req)).await {
            Ok(outcome) => outcome,
            Err(_) => ChallengeOutcome::fail(
                remote.label().to_string(),
                Problem::connection(format!(
                    "no corroboration answer within {}ms",
                    deadline.as_millis()
                )),
                deadline,
            ),
        }
    });
    join_all(calls).await
}
