use std::fmt;
use thiserror::Error;
use vantage_core::Problem;

/// Classification of a failed DNS query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsErrorKind {
    /// The attempt timed out
    Timeout,
    /// The authority answered SERVFAIL
    ServFail,
    /// The name does not exist
    NxDomain,
    /// The authority refused the query
    Refused,
    /// Well-formed answer with no records of the requested type
    Empty,
    /// Transport-level failure (connection refused, reset)
    Network,
    /// The answer was rejected by policy (loopback/link-local address)
    Rejected,
}

impl DnsErrorKind {
    /// Transient failures are the only ones worth retrying
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Network)
    }

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ServFail => "servfail",
            Self::NxDomain => "nxdomain",
            Self::Refused => "refused",
            Self::Empty => "empty",
            Self::Network => "network",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DnsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS query that did not produce usable records
#[derive(Error, Debug, Clone)]
#[error("dns {kind} for {query}: {detail} (after {attempts} attempts)")]
pub struct DnsError {
    /// Failure class
    pub kind: DnsErrorKind,
    /// The queried name
    pub query: String,
    /// Underlying detail
    pub detail: String,
    /// Attempts made before giving up
    pub attempts: u32,
}

impl DnsError {
    /// Create an error
    #[must_use]
    pub fn new(
        kind: DnsErrorKind,
        query: impl Into<String>,
        detail: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            kind,
            query: query.into(),
            detail: detail.into(),
            attempts,
        }
    }
}

impl From<DnsError> for Problem {
    fn from(err: DnsError) -> Self {
        Self::dns(err.to_string())
    }
}
