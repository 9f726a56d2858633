//! Scripted resolver for tests.
//!
//! Lets the engine crates test CAA climbing, challenge lookups, and retry
//! handling without network access. Every query is recorded so tests can
//! assert on what was (or was not) asked.

use crate::{DnsError, DnsErrorKind, DnsLookup, DnsOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use vantage_core::CaaRecord;

/// In-memory [`DnsLookup`] built from canned answers.
///
/// Missing address/TXT names answer NXDOMAIN; missing CAA names answer an
/// empty record set (matching how a real resolver feeds tree climbing).
/// Scripted errors win over canned answers.
#[derive(Debug, Default)]
pub struct StaticDns {
    ips: HashMap<String, Vec<IpAddr>>,
    txts: HashMap<String, Vec<String>>,
    caas: HashMap<String, Vec<CaaRecord>>,
    errors: HashMap<String, DnsErrorKind>,
    queries: Mutex<Vec<String>>,
}

impl StaticDns {
    /// Empty resolver; everything answers negatively
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script address records for a host
    #[must_use]
    pub fn with_ips(mut self, host: &str, ips: Vec<IpAddr>) -> Self {
        self.ips.insert(host.to_string(), ips);
        self
    }

    /// Script TXT records for a name
    #[must_use]
    pub fn with_txt(mut self, name: &str, records: Vec<String>) -> Self {
        self.txts.insert(name.to_string(), records);
        self
    }

    /// Script CAA records for a name
    #[must_use]
    pub fn with_caa(mut self, name: &str, records: Vec<CaaRecord>) -> Self {
        self.caas.insert(name.to_string(), records);
        self
    }

    /// Script a failure for any lookup of a name
    #[must_use]
    pub fn with_error(mut self, name: &str, kind: DnsErrorKind) -> Self {
        self.errors.insert(name.to_string(), kind);
        self
    }

    /// Queries seen so far, as `"TYPE name"` strings in order
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("query log poisoned").clone()
    }

    fn record(&self, rr_type: &str, name: &str) {
        self.queries
            .lock()
            .expect("query log poisoned")
            .push(format!("{rr_type} {name}"));
    }

    fn scripted_error(&self, name: &str, query: &str) -> Option<DnsError> {
        self.errors
            .get(name)
            .map(|kind| DnsError::new(*kind, query, "scripted failure", 1))
    }
}

#[async_trait]
impl DnsLookup for StaticDns {
    async fn lookup_ips(&self, host: &str) -> Result<DnsOutcome<IpAddr>, DnsError> {
        self.record("A", host);
        if let Some(err) = self.scripted_error(host, host) {
            return Err(err);
        }
        match self.ips.get(host) {
            Some(records) => Ok(DnsOutcome {
                records: records.clone(),
                attempts: 1,
            }),
            None => Err(DnsError::new(
                DnsErrorKind::NxDomain,
                host,
                "no such host",
                1,
            )),
        }
    }

    async fn lookup_txt(&self, name: &str) -> Result<DnsOutcome<String>, DnsError> {
        self.record("TXT", name);
        if let Some(err) = self.scripted_error(name, name) {
            return Err(err);
        }
        match self.txts.get(name) {
            Some(records) => Ok(DnsOutcome {
                records: records.clone(),
                attempts: 1,
            }),
            None => Err(DnsError::new(
                DnsErrorKind::NxDomain,
                name,
                "no such name",
                1,
            )),
        }
    }

    async fn lookup_caa(&self, name: &str) -> Result<DnsOutcome<CaaRecord>, DnsError> {
        self.record("CAA", name);
        if let Some(err) = self.scripted_error(name, name) {
            return Err(err);
        }
        Ok(DnsOutcome {
            records: self.caas.get(name).cloned().unwrap_or_default(),
            attempts: 1,
        })
    }
}
