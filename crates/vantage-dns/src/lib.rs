//! DNS resolution for the vantage validation engine.
//!
//! Validation queries get a resolver with bounded retry, a per-attempt
//! timeout, and an exception list that downgrades known-broken SERVFAIL
//! authorities on CAA lookups. Outcomes are produced fresh per query and
//! never cached across validation requests.

mod error;
mod hostlist;
mod resolver;
pub mod test_utils;

use async_trait::async_trait;
use std::net::IpAddr;

pub use error::{DnsError, DnsErrorKind};
pub use hostlist::HostList;
pub use resolver::Resolver;
use vantage_core::CaaRecord;

/// Records plus how many attempts it took to get them
#[derive(Debug, Clone)]
pub struct DnsOutcome<T> {
    /// Answer records (possibly empty for CAA lookups)
    pub records: Vec<T>,
    /// Attempts made, counting retries
    pub attempts: u32,
}

/// Lookup capability consumed by the validation engine.
///
/// The engine only ever needs addresses (challenge connections), TXT
/// records (DNS-01 proofs), and CAA records (issuance policy).
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Resolve a host to its addresses
    async fn lookup_ips(&self, host: &str) -> Result<DnsOutcome<IpAddr>, DnsError>;

    /// Look up TXT records
    async fn lookup_txt(&self, name: &str) -> Result<DnsOutcome<String>, DnsError>;

    /// Look up CAA records. An empty outcome means "no CAA restriction at
    /// this name"; NXDOMAIN is folded into that, SERVFAIL is an error
    /// unless the name is on the exception list.
    async fn lookup_caa(&self, name: &str) -> Result<DnsOutcome<CaaRecord>, DnsError>;
}
