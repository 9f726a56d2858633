//! The quorum orchestrator.
//!
//! Sequences reputation, local challenge, and CAA gates, then corroborates
//! the local decision across the remote VA set and applies the failure
//! threshold. Cheap deterministic local checks run first and gate the
//! expensive multi-party fan-out.

use crate::caa::CaaEvaluator;
use crate::challenge::{ChallengeCheck, Dns01Check, Http01Check, TlsAlpn01Check};
use crate::remote::{self, RemoteVa};
use crate::reputation::{DomainReputation, ReputationVerdict};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vantage_cdr::CaaProxyLookup;
use vantage_core::{
    CdrMode, ChallengeKind, ChallengeOutcome, Problem, QuorumVerdict, RemoteFailure, Result,
    VaConfig, ValidationRequest, ValidationState, LOCAL_PERSPECTIVE,
};
use vantage_dns::DnsLookup;

/// The validation authority.
///
/// Cheap to clone; all state is immutable after construction, so any
/// number of requests may run concurrently without coordination.
#[derive(Clone)]
pub struct ValidationAuthority {
    inner: Arc<Inner>,
}

struct Inner {
    config: VaConfig,
    reputation: Arc<dyn DomainReputation>,
    caa: CaaEvaluator,
    remotes: Vec<RemoteVa>,
    challenges: HashMap<ChallengeKind, Box<dyn ChallengeCheck>>,
}

impl ValidationAuthority {
    /// Assemble the engine. Validates the configuration, so an
    /// unsatisfiable threshold or malformed exception list refuses to
    /// start here.
    pub fn new(
        config: VaConfig,
        dns: Arc<dyn DnsLookup>,
        reputation: Arc<dyn DomainReputation>,
        distributed: Option<Arc<dyn CaaProxyLookup>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut caa = CaaEvaluator::new(Arc::clone(&dns), &config.issuer_domain);
        if let Some(cdr) = distributed {
            let mode = config.cdr.as_ref().map_or_else(CdrMode::default, |c| c.mode);
            caa = caa.with_distributed(cdr, mode);
        }

        let remotes = config
            .remotes
            .iter()
            .map(|r| RemoteVa::new(r, &config.user_agent, config.corroboration_timeout()))
            .collect::<Result<Vec<_>>>()?;

        let mut challenges: HashMap<ChallengeKind, Box<dyn ChallengeCheck>> = HashMap::new();
        challenges.insert(
            ChallengeKind::Http01,
            Box::new(Http01Check::new(
                Arc::clone(&dns),
                config.ports.http,
                config.user_agent.clone(),
                config.challenge_timeout(),
            )),
        );
        challenges.insert(
            ChallengeKind::Dns01,
            Box::new(Dns01Check::new(Arc::clone(&dns))),
        );
        challenges.insert(
            ChallengeKind::TlsAlpn01,
            Box::new(TlsAlpn01Check::new(
                Arc::clone(&dns),
                config.ports.tls,
                config.challenge_timeout(),
            )),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                reputation,
                caa,
                remotes,
                challenges,
            }),
        })
    }

    /// Decide one validation request.
    ///
    /// Exactly one verdict per request; there are no retries across
    /// stages. The whole pipeline runs under the overall deadline, which
    /// cancels any outstanding DNS, challenge, or RPC work on expiry.
    pub async fn perform_validation(&self, req: &ValidationRequest) -> QuorumVerdict {
        let started = Instant::now();
        let verdict = match timeout(self.inner.config.overall_timeout(), self.decide(req)).await {
            Ok(verdict) => verdict,
            Err(_) => QuorumVerdict::reject(Problem::internal(format!(
                "validation deadline of {}ms exceeded",
                self.inner.config.overall_timeout_ms
            ))),
        };
        info!(
            domain = %req.domain,
            challenge = %req.challenge,
            success = verdict.success,
            remote_successes = verdict.remote_successes,
            remote_failures = verdict.remote_failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "validation decided"
        );
        verdict
    }

    async fn decide(&self, req: &ValidationRequest) -> QuorumVerdict {
        let mut state = ValidationState::LocalChecking;
        debug!(domain = %req.domain, ?state, "starting local checks");

        // 1. Blocklist veto. Provider trouble fails open, but is recorded.
        match self.inner.reputation.check(&req.domain).await {
            ReputationVerdict::Blocked { reason } => {
                return QuorumVerdict::reject(Problem::blocked(reason));
            }
            ReputationVerdict::Unknown { detail } => {
                warn!(domain = %req.domain, detail, "reputation inconclusive, proceeding");
            }
            ReputationVerdict::Clear => {}
        }

        // 2. Local challenge proof. A request that fails at its origin is
        // not worth corroborating.
        let local = self.check_local(req).await;
        if !local.success {
            let problem = local
                .problem
                .unwrap_or_else(|| Problem::internal("local check failed without detail"));
            return QuorumVerdict::reject(problem);
        }

        // 3. Local CAA policy.
        let caa = self.inner.caa.check(&req.domain, req.wildcard).await;
        if !caa.authorized {
            return QuorumVerdict::reject(Problem::caa(caa.reason));
        }

        // 4. Corroborate from every remote perspective.
        if self.inner.remotes.is_empty() {
            return QuorumVerdict::pass(0, Vec::new());
        }
        state = ValidationState::Corroborating;
        debug!(domain = %req.domain, ?state, peers = self.inner.remotes.len(), "fanning out");
        let outcomes = remote::corroborate(
            &self.inner.remotes,
            req,
            self.inner.config.corroboration_timeout(),
        )
        .await;

        // 5. Threshold decision.
        self.tally(req, outcomes)
    }

    fn tally(&self, req: &ValidationRequest, outcomes: Vec<ChallengeOutcome>) -> QuorumVerdict {
        let mut successes = 0usize;
        let mut failures = Vec::new();
        for outcome in outcomes {
            if outcome.success {
                successes += 1;
            } else {
                failures.push(RemoteFailure {
                    label: outcome.perspective,
                    problem: outcome.problem.unwrap_or_else(|| {
                        Problem::internal("remote outcome missing problem detail")
                    }),
                });
            }
        }

        if failures.len() <= self.inner.config.max_remote_failures {
            QuorumVerdict::pass(successes, failures)
        } else {
            warn!(
                domain = %req.domain,
                failed = failures.len(),
                tolerated = self.inner.config.max_remote_failures,
                "remote corroboration below quorum"
            );
            QuorumVerdict::reject_quorum(successes, failures)
        }
    }

    async fn check_local(&self, req: &ValidationRequest) -> ChallengeOutcome {
        let started = Instant::now();
        let Some(check) = self.inner.challenges.get(&req.challenge) else {
            return ChallengeOutcome::fail(
                LOCAL_PERSPECTIVE,
                Problem::malformed(format!("unsupported challenge type {}", req.challenge)),
                started.elapsed(),
            );
        };
        match check.check(req).await {
            Ok(()) => ChallengeOutcome::pass(LOCAL_PERSPECTIVE, started.elapsed()),
            Err(problem) => ChallengeOutcome::fail(LOCAL_PERSPECTIVE, problem, started.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vantage_core::{CaaRecord, DnsConfig, PortConfig, ProblemKind};
    use vantage_dns::test_utils::StaticDns;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ISSUER: &str = "ca.example.net";

    struct StubReputation(ReputationVerdict);

    #[async_trait]
    impl DomainReputation for StubReputation {
        async fn check(&self, _domain: &str) -> ReputationVerdict {
            self.0.clone()
        }
    }

    struct CountingCheck {
        calls: Arc<AtomicUsize>,
        outcome: std::result::Result<(), Problem>,
    }

    #[async_trait]
    impl ChallengeCheck for CountingCheck {
        async fn check(&self, _req: &ValidationRequest) -> std::result::Result<(), Problem> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct SlowCheck;

    #[async_trait]
    impl ChallengeCheck for SlowCheck {
        async fn check(&self, _req: &ValidationRequest) -> std::result::Result<(), Problem> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn request() -> ValidationRequest {
        ValidationRequest {
            domain: "example.com".to_string(),
            challenge: ChallengeKind::Http01,
            account_uri: "acct:1".to_string(),
            token: "tok".to_string(),
            key_authorization: "tok.thumbprint".to_string(),
            wildcard: false,
        }
    }

    fn config(remotes: Vec<vantage_core::RemoteVaConfig>, max_remote_failures: usize) -> VaConfig {
        VaConfig {
            issuer_domain: ISSUER.to_string(),
            user_agent: "test-va".to_string(),
            ports: PortConfig::default(),
            dns: DnsConfig::default(),
            cdr: None,
            remotes,
            max_remote_failures,
            challenge_timeout_ms: 2_000,
            corroboration_timeout_ms: 2_000,
            overall_timeout_ms: 10_000,
        }
    }

    fn passing_check(calls: &Arc<AtomicUsize>) -> Box<dyn ChallengeCheck> {
        Box::new(CountingCheck {
            calls: Arc::clone(calls),
            outcome: Ok(()),
        })
    }

    fn failing_check(calls: &Arc<AtomicUsize>) -> Box<dyn ChallengeCheck> {
        Box::new(CountingCheck {
            calls: Arc::clone(calls),
            outcome: Err(Problem::unauthorized("content mismatch")),
        })
    }

    fn engine(
        config: VaConfig,
        dns: Arc<StaticDns>,
        reputation: ReputationVerdict,
        check: Box<dyn ChallengeCheck>,
    ) -> ValidationAuthority {
        let remotes = config
            .remotes
            .iter()
            .map(|r| RemoteVa::new(r, "test-va", config.corroboration_timeout()).unwrap())
            .collect();
        let caa = CaaEvaluator::new(dns, &config.issuer_domain);
        let mut challenges: HashMap<ChallengeKind, Box<dyn ChallengeCheck>> = HashMap::new();
        challenges.insert(ChallengeKind::Http01, check);
        ValidationAuthority {
            inner: Arc::new(Inner {
                config,
                reputation: Arc::new(StubReputation(reputation)),
                caa,
                remotes,
                challenges,
            }),
        }
    }

    async fn mock_remote(success: bool, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        let body = if success {
            serde_json::json!({ "success": true })
        } else {
            serde_json::json!({
                "success": false,
                "problem": { "kind": "unauthorized", "detail": "content mismatch" }
            })
        };
        Mock::given(method("POST"))
            .and(path(remote::RPC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn remote_config(server: &MockServer, label: &str) -> vantage_core::RemoteVaConfig {
        vantage_core::RemoteVaConfig {
            url: server.uri(),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_all_gates_pass_without_remotes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(verdict.success);
        assert_eq!(verdict.remote_successes, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quorum_boundary_exactly_at_threshold() {
        // 5 perspectives, 2 tolerated failures, exactly 2 failing.
        let mut servers = Vec::new();
        for success in [true, true, true, false, false] {
            servers.push(mock_remote(success, 1).await);
        }
        let remotes = servers
            .iter()
            .enumerate()
            .map(|(i, s)| remote_config(s, &format!("va-{i}")))
            .collect();

        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(remotes, 2),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(verdict.success);
        assert_eq!(verdict.remote_successes, 3);
        assert_eq!(verdict.remote_failures.len(), 2);
    }

    #[tokio::test]
    async fn test_quorum_boundary_one_past_threshold() {
        // Same set size, 3 failing: one past the tolerance.
        let mut servers = Vec::new();
        for success in [true, true, false, false, false] {
            servers.push(mock_remote(success, 1).await);
        }
        let remotes = servers
            .iter()
            .enumerate()
            .map(|(i, s)| remote_config(s, &format!("va-{i}")))
            .collect();

        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(remotes, 2),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.remote_successes, 2);
        assert_eq!(verdict.remote_failures.len(), 3);

        // Caller-facing detail stays generic; the labels live only in the
        // per-perspective failure records.
        let problem = verdict.problem.unwrap();
        assert_eq!(problem.kind, ProblemKind::Quorum);
        assert!(!problem.detail.contains("va-"));
        assert!(verdict.remote_failures.iter().any(|f| f.label == "va-2"));
    }

    #[tokio::test]
    async fn test_local_failure_sends_zero_remote_rpcs() {
        let server_a = mock_remote(true, 0).await;
        let server_b = mock_remote(true, 0).await;
        let remotes = vec![
            remote_config(&server_a, "va-a"),
            remote_config(&server_b, "va-b"),
        ];

        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(remotes, 1),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            failing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.problem.unwrap().kind, ProblemKind::Unauthorized);
        // MockServer::verify on drop asserts the expect(0) bounds.
    }

    #[tokio::test]
    async fn test_blocked_domain_is_terminal_before_challenges() {
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Blocked {
                reason: "known phishing target".to_string(),
            },
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.problem.unwrap().kind, ProblemKind::Blocked);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reputation_unknown_fails_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Unknown {
                detail: "provider down".to_string(),
            },
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(verdict.success);
    }

    #[tokio::test]
    async fn test_caa_denial_is_terminal() {
        let dns = Arc::new(StaticDns::new().with_caa(
            "example.com",
            vec![CaaRecord::new("issue", "other-ca.example", false)],
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            dns,
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let verdict = va.perform_validation(&request()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.problem.unwrap().kind, ProblemKind::Caa);
        // The local challenge ran first; CAA came after.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_challenge_type_is_malformed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let mut req = request();
        req.challenge = ChallengeKind::Dns01; // not registered in this test engine
        let verdict = va.perform_validation(&req).await;
        assert!(!verdict.success);
        assert_eq!(verdict.problem.unwrap().kind, ProblemKind::Malformed);
    }

    #[tokio::test]
    async fn test_overall_deadline_cancels_validation() {
        let mut cfg = config(Vec::new(), 0);
        cfg.overall_timeout_ms = 200;
        let va = engine(
            cfg,
            Arc::new(StaticDns::new()),
            ReputationVerdict::Clear,
            Box::new(SlowCheck),
        );
        let started = Instant::now();
        let verdict = va.perform_validation(&request()).await;
        assert!(!verdict.success);
        assert!(started.elapsed() < Duration::from_secs(5));
        let problem = verdict.problem.unwrap();
        assert_eq!(problem.kind, ProblemKind::Internal);
        assert!(problem.detail.contains("deadline"));
    }

    #[tokio::test]
    async fn test_identical_request_yields_identical_verdict() {
        let dns = Arc::new(StaticDns::new().with_caa(
            "example.com",
            vec![CaaRecord::new("issue", ISSUER, false)],
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let va = engine(
            config(Vec::new(), 0),
            dns,
            ReputationVerdict::Clear,
            passing_check(&calls),
        );
        let req = request();
        let first = va.perform_validation(&req).await;
        let second = va.perform_validation(&req).await;
        assert_eq!(first.success, second.success);
        assert_eq!(first.remote_successes, second.remote_successes);
        assert_eq!(
            first.problem.map(|p| p.kind),
            second.problem.map(|p| p.kind)
        );
    }

    #[tokio::test]
    async fn test_constructor_rejects_unsatisfiable_threshold() {
        let mut cfg = config(Vec::new(), 0);
        cfg.max_remote_failures = 1; // no remotes configured
        let result = ValidationAuthority::new(
            cfg,
            Arc::new(StaticDns::new()),
            Arc::new(StubReputation(ReputationVerdict::Clear)),
            None,
        );
        assert!(result.is_err());
    }
}
