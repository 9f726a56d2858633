//! Problem details attached to validation failures.
//!
//! Every terminal failure carries a [`Problem`] that distinguishes CAA
//! denial, challenge-proof failure, and insufficient corroboration. Quorum
//! problems stay deliberately generic: they never name the remote
//! perspective that disagreed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    /// Could not reach the target (TCP, HTTP transport)
    Connection,
    /// DNS resolution failed
    Dns,
    /// TLS handshake or certificate inspection failed
    Tls,
    /// The target answered, but the proof artifact was wrong
    Unauthorized,
    /// A CAA record forbids issuance by this CA
    Caa,
    /// The domain is on the malware/phishing blocklist
    Blocked,
    /// Not enough remote perspectives corroborated the validation
    Quorum,
    /// The request itself was malformed
    Malformed,
    /// Internal error in the validation engine
    Internal,
}

impl ProblemKind {
    /// Stable identifier used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Dns => "dns",
            Self::Tls => "tls",
            Self::Unauthorized => "unauthorized",
            Self::Caa => "caa",
            Self::Blocked => "blocked",
            Self::Quorum => "quorum",
            Self::Malformed => "malformed",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A human-readable failure description with a machine-readable class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Failure class
    pub kind: ProblemKind,
    /// Human-readable detail, safe to surface to the requester
    pub detail: String,
}

impl Problem {
    /// Create a problem of the given kind
    #[must_use]
    pub fn new(kind: ProblemKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Connection-class problem
    #[must_use]
    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Connection, detail)
    }

    /// DNS-class problem
    #[must_use]
    pub fn dns(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Dns, detail)
    }

    /// TLS-class problem
    #[must_use]
    pub fn tls(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Tls, detail)
    }

    /// Wrong-proof problem
    #[must_use]
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Unauthorized, detail)
    }

    /// CAA denial
    #[must_use]
    pub fn caa(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Caa, detail)
    }

    /// Blocklist veto
    #[must_use]
    pub fn blocked(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Blocked, detail)
    }

    /// Insufficient corroboration. The detail is fixed so callers cannot
    /// learn which perspective rejected the request.
    #[must_use]
    pub fn quorum() -> Self {
        Self::new(
            ProblemKind::Quorum,
            "insufficient corroboration from remote perspectives",
        )
    }

    /// Malformed request
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Malformed, detail)
    }

    /// Internal engine error
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::Internal, detail)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}
