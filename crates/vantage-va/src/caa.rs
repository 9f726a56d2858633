//! CAA policy evaluation.
//!
//! Walks the domain from most to least specific label until a CAA record
//! set is found or the public-suffix boundary is reached; an empty result
//! at every level means issuance is unrestricted. When a distributed
//! resolver is configured, lookups go through the proxy vantage points
//! instead of (or in addition to) the local resolver, and quorum failures
//! deny issuance.

use std::sync::Arc;
use tracing::debug;
use vantage_cdr::CaaProxyLookup;
use vantage_core::{CaaDecision, CaaRecord, CaaSourceOutcome, CdrMode, LOCAL_PERSPECTIVE};
use vantage_dns::DnsLookup;

/// Decides whether this CA is authorized to issue for a domain
pub struct CaaEvaluator {
    dns: Arc<dyn DnsLookup>,
    issuer_domain: String,
    distributed: Option<Arc<dyn CaaProxyLookup>>,
    mode: CdrMode,
}

enum Fetch {
    /// Record set at this name (possibly empty), with source outcomes
    Records(Vec<CaaRecord>, Vec<CaaSourceOutcome>),
    /// Lookup failed hard; evaluation stops with this decision
    Failed(CaaDecision),
}

impl CaaEvaluator {
    /// Evaluator using only the local resolver
    #[must_use]
    pub fn new(dns: Arc<dyn DnsLookup>, issuer_domain: impl Into<String>) -> Self {
        Self {
            dns,
            issuer_domain: issuer_domain.into(),
            distributed: None,
            mode: CdrMode::Exclusive,
        }
    }

    /// Add a distributed resolver with the configured precedence
    #[must_use]
    pub fn with_distributed(mut self, cdr: Arc<dyn CaaProxyLookup>, mode: CdrMode) -> Self {
        self.distributed = Some(cdr);
        self.mode = mode;
        self
    }

    /// Check authorization for `domain`. `wildcard` selects `issuewild`
    /// semantics. A denial is final: it is never retried speculatively.
    pub async fn check(&self, domain: &str, wildcard: bool) -> CaaDecision {
        let base = domain.trim_start_matches("*.");
        for name in climb(base) {
            match self.fetch(&name).await {
                Fetch::Records(records, sources) => {
                    if records.is_empty() {
                        continue;
                    }
                    debug!(name, records = records.len(), "found CAA record set");
                    return evaluate(&name, &records, &self.issuer_domain, wildcard, sources);
                }
                Fetch::Failed(decision) => return decision,
            }
        }
        CaaDecision {
            authorized: true,
            reason: format!("no CAA records for {base} or any parent"),
            sources: Vec::new(),
        }
    }

    async fn fetch(&self, name: &str) -> Fetch {
        match (&self.distributed, self.mode) {
            (None, _) => self.fetch_local(name).await,
            (Some(cdr), CdrMode::Exclusive) => Self::fetch_distributed(cdr.as_ref(), name).await,
            (Some(cdr), CdrMode::RequireAgreement) => {
                let local = self.fetch_local(name).await;
                let distributed = Self::fetch_distributed(cdr.as_ref(), name).await;
                match (local, distributed) {
                    (Fetch::Failed(decision), _) | (_, Fetch::Failed(decision)) => {
                        Fetch::Failed(decision)
                    }
                    (Fetch::Records(local_records, mut sources), Fetch::Records(remote_records, remote_sources)) => {
                        sources.extend(remote_sources);
                        if canonical_set(&local_records) == canonical_set(&remote_records) {
                            Fetch::Records(local_records, sources)
                        } else {
                            Fetch::Failed(CaaDecision {
                                authorized: false,
                                reason: format!(
                                    "local and distributed CAA answers for {name} disagree"
                                ),
                                sources,
                            })
                        }
                    }
                }
            }
        }
    }

    async fn fetch_local(&self, name: &str) -> Fetch {
        match self.dns.lookup_caa(name).await {
            Ok(outcome) => Fetch::Records(
                outcome.records,
                vec![CaaSourceOutcome {
                    source: LOCAL_PERSPECTIVE.to_string(),
                    ok: true,
                    detail: None,
                }],
            ),
            Err(err) => Fetch::Failed(CaaDecision {
                authorized: false,
                reason: format!("CAA lookup for {name} failed: {err}"),
                sources: vec![CaaSourceOutcome {
                    source: LOCAL_PERSPECTIVE.to_string(),
                    ok: false,
                    detail: Some(err.to_string()),
                }],
            }),
        }
    }

    async fn fetch_distributed(cdr: &dyn CaaProxyLookup, name: &str) -> Fetch {
        let consensus = cdr.lookup_caa(name).await;
        match consensus.outcome {
            Ok(records) => Fetch::Records(records, consensus.sources),
            Err(err) => Fetch::Failed(CaaDecision {
                authorized: false,
                reason: format!("distributed CAA lookup for {name} failed closed: {err}"),
                sources: consensus.sources,
            }),
        }
    }
}

/// Names to query, most to least specific, stopping at the public-suffix
/// boundary (the final label is never consulted).
fn climb(domain: &str) -> Vec<String> {
    let name = domain.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = name.split('.').filter(|label| !label.is_empty()).collect();
    if labels.len() <= 1 {
        return vec![name];
    }
    (0..labels.len() - 1)
        .map(|i| labels[i..].join("."))
        .collect()
}

/// Apply RFC 8659 semantics to a found record set
fn evaluate(
    name: &str,
    records: &[CaaRecord],
    issuer_domain: &str,
    wildcard: bool,
    sources: Vec<CaaSourceOutcome>,
) -> CaaDecision {
    // An unrecognized critical property forbids issuance outright.
    if let Some(record) = records.iter().find(|r| {
        r.critical && !matches!(r.tag.to_ascii_lowercase().as_str(), "issue" | "issuewild" | "iodef")
    }) {
        return CaaDecision {
            authorized: false,
            reason: format!("unrecognized critical CAA property {:?} at {name}", record.tag),
            sources,
        };
    }

    let issuewild: Vec<&CaaRecord> = records
        .iter()
        .filter(|r| r.tag.eq_ignore_ascii_case("issuewild"))
        .collect();
    let issue: Vec<&CaaRecord> = records
        .iter()
        .filter(|r| r.tag.eq_ignore_ascii_case("issue"))
        .collect();

    // Wildcard requests answer to issuewild when any is present.
    let relevant = if wildcard && !issuewild.is_empty() {
        &issuewild
    } else {
        &issue
    };

    if relevant.is_empty() {
        return CaaDecision {
            authorized: true,
            reason: format!("CAA records at {name} place no restriction on this request"),
            sources,
        };
    }

    let matched = relevant.iter().any(|record| {
        let issuer = record.issuer_name();
        !issuer.is_empty() && issuer.eq_ignore_ascii_case(issuer_domain)
    });

    if matched {
        CaaDecision {
            authorized: true,
            reason: format!("CAA record at {name} authorizes {issuer_domain}"),
            sources,
        }
    } else {
        CaaDecision {
            authorized: false,
            reason: format!("CAA records at {name} do not authorize {issuer_domain}"),
            sources,
        }
    }
}

fn canonical_set(records: &[CaaRecord]) -> String {
    let mut keys: Vec<String> = records.iter().map(CaaRecord::canonical).collect();
    keys.sort();
    keys.join("\n")
}
