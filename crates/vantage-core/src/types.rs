//! Request, outcome, and verdict types shared across the engine.

use crate::problem::Problem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Perspective identifier for the local validation authority
pub const LOCAL_PERSPECTIVE: &str = "local";

/// Challenge types the engine knows how to validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeKind {
    /// HTTP-01: proof artifact fetched over plain HTTP
    #[serde(rename = "http-01")]
    Http01,
    /// DNS-01: proof digest published in a TXT record
    #[serde(rename = "dns-01")]
    Dns01,
    /// TLS-ALPN-01: proof certificate presented on a TLS handshake
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
            Self::TlsAlpn01 => "tls-alpn-01",
        };
        f.write_str(s)
    }
}

/// One domain-control validation request.
///
/// Immutable once handed to the orchestrator; a caller wanting a retry
/// issues a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Domain name under validation
    pub domain: String,
    /// Challenge type declared by the order
    pub challenge: ChallengeKind,
    /// Account identity the challenge belongs to
    pub account_uri: String,
    /// Challenge token
    pub token: String,
    /// Key authorization (token + account key thumbprint)
    pub key_authorization: String,
    /// Whether the requested certificate is a wildcard (selects `issuewild`
    /// CAA semantics)
    #[serde(default)]
    pub wildcard: bool,
}

/// A single CAA property record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaaRecord {
    /// Property tag (`issue`, `issuewild`, `iodef`, ...)
    pub tag: String,
    /// Raw property value
    pub value: String,
    /// Issuer-critical flag
    pub critical: bool,
}

impl CaaRecord {
    /// Create a record
    #[must_use]
    pub fn new(tag: impl Into<String>, value: impl Into<String>, critical: bool) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
            critical,
        }
    }

    /// The issuer name of an `issue`/`issuewild` record with any
    /// parameters stripped: `"ca.example; account=123"` -> `"ca.example"`.
    #[must_use]
    pub fn issuer_name(&self) -> &str {
        self.value.split(';').next().unwrap_or("").trim()
    }

    /// Canonical `tag value` form used when comparing answers from
    /// independent vantage points.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{} {} {}",
            u8::from(self.critical),
            self.tag.to_ascii_lowercase(),
            self.value.trim()
        )
    }
}

impl fmt::Display for CaaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} \"{}\"",
            if self.critical { 128 } else { 0 },
            self.tag,
            self.value
        )
    }
}

/// Outcome of one perspective's challenge validation attempt
#[derive(Debug, Clone)]
pub struct ChallengeOutcome {
    /// `"local"` or a remote VA's display label
    pub perspective: String,
    /// Whether the proof check passed
    pub success: bool,
    /// Failure detail when it did not
    pub problem: Option<Problem>,
    /// How long the attempt took
    pub elapsed: Duration,
}

impl ChallengeOutcome {
    /// Successful outcome for a perspective
    #[must_use]
    pub fn pass(perspective: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            perspective: perspective.into(),
            success: true,
            problem: None,
            elapsed,
        }
    }

    /// Failed outcome for a perspective
    #[must_use]
    pub fn fail(perspective: impl Into<String>, problem: Problem, elapsed: Duration) -> Self {
        Self {
            perspective: perspective.into(),
            success: false,
            problem: Some(problem),
            elapsed,
        }
    }
}

/// A remote perspective that failed, kept for later diagnosis
#[derive(Debug, Clone)]
pub struct RemoteFailure {
    /// Display label of the remote VA
    pub label: String,
    /// What went wrong at that perspective
    pub problem: Problem,
}

/// Terminal verdict for one [`ValidationRequest`].
///
/// Produced exactly once per request and never mutated afterward. The
/// per-perspective failure list is for operators; the top-level `problem`
/// is what callers see.
#[derive(Debug, Clone)]
pub struct QuorumVerdict {
    /// Overall accept/reject decision
    pub success: bool,
    /// Number of remote perspectives that corroborated
    pub remote_successes: usize,
    /// Remote perspectives that failed, with details
    pub remote_failures: Vec<RemoteFailure>,
    /// Caller-facing failure detail (first hard failure, or a generic
    /// quorum problem)
    pub problem: Option<Problem>,
}

impl QuorumVerdict {
    /// Verdict for a request that passed all gates
    #[must_use]
    pub fn pass(remote_successes: usize, remote_failures: Vec<RemoteFailure>) -> Self {
        Self {
            success: true,
            remote_successes,
            remote_failures,
            problem: None,
        }
    }

    /// Verdict for a request rejected before corroboration
    #[must_use]
    pub fn reject(problem: Problem) -> Self {
        Self {
            success: false,
            remote_successes: 0,
            remote_failures: Vec::new(),
            problem: Some(problem),
        }
    }

    /// Verdict for a request that failed quorum
    #[must_use]
    pub fn reject_quorum(remote_successes: usize, remote_failures: Vec<RemoteFailure>) -> Self {
        Self {
            success: false,
            remote_successes,
            remote_failures,
            problem: Some(Problem::quorum()),
        }
    }
}

/// Per-request progression through the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// Accepted, not yet started
    Pending,
    /// Running reputation, challenge, and CAA gates
    LocalChecking,
    /// Fanning out to remote perspectives
    Corroborating,
    /// Terminal
    Decided,
}

/// Outcome of one CAA source (the local resolver or one proxy)
#[derive(Debug, Clone)]
pub struct CaaSourceOutcome {
    /// Source identifier (`"local"` or a proxy address)
    pub source: String,
    /// Whether the source answered in time
    pub ok: bool,
    /// Error detail when it did not
    pub detail: Option<String>,
}

/// Decision of the CAA evaluator for one domain
#[derive(Debug, Clone)]
pub struct CaaDecision {
    /// Whether this CA may issue for the domain
    pub authorized: bool,
    /// Human-readable reason
    pub reason: String,
    /// Per-source outcomes when a distributed resolver was involved
    pub sources: Vec<CaaSourceOutcome>,
}
