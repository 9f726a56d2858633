//! Proxy fan-out client.
//!
//! Each configured proxy fronts one network vantage point. A lookup sends
//! the same DoH JSON query through every proxy concurrently, bounded by a
//! per-call timeout, and reconciles the answers.

use crate::{CaaProxyLookup, CdrError, ProxyConsensus};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use vantage_core::{CaaRecord, CaaSourceOutcome, CdrConfig, Result, VaError};

/// DNS wire type for CAA
const CAA_TYPE: u16 = 257;

/// DoH response codes we care about
const DOH_NOERROR: u32 = 0;
const DOH_NXDOMAIN: u32 = 3;

struct ProxyClient {
    label: String,
    http: reqwest::Client,
}

/// Client for a fixed set of distributed-resolver proxies.
///
/// Proxy connections are long-lived and shared read-only across requests;
/// nothing here is mutated after construction.
pub struct CdrClient {
    proxies: Vec<ProxyClient>,
    endpoint: String,
    call_timeout: Duration,
    max_failures: usize,
}

impl CdrClient {
    /// Build one HTTP client per proxy. Fails at startup when the failure
    /// tolerance cannot be satisfied by the proxy set.
    pub fn new(config: &CdrConfig, user_agent: &str) -> Result<Self> {
        if config.proxies.is_empty() {
            return Err(VaError::Config("cdr proxy set must not be empty".into()));
        }
        if config.max_failures >= config.proxies.len() {
            return Err(VaError::Config(format!(
                "cdr max_failures ({}) must be below the proxy count ({})",
                config.max_failures,
                config.proxies.len()
            )));
        }

        let mut proxies = Vec::with_capacity(config.proxies.len());
        for address in &config.proxies {
            let proxy = reqwest::Proxy::all(address)
                .map_err(|e| VaError::Config(format!("cdr proxy {address}: {e}")))?;
            let http = reqwest::Client::builder()
                .proxy(proxy)
                .timeout(config.timeout())
                .user_agent(user_agent)
                .build()
                .map_err(|e| VaError::Config(format!("cdr client for {address}: {e}")))?;
            proxies.push(ProxyClient {
                label: address.clone(),
                http,
            });
        }

        Ok(Self {
            proxies,
            endpoint: config.resolver.clone(),
            call_timeout: config.timeout(),
            max_failures: config.max_failures,
        })
    }

    async fn query_proxy(
        &self,
        proxy: &ProxyClient,
        name: &str,
    ) -> std::result::Result<Vec<CaaRecord>, String> {
        let request = proxy
            .http
            .get(&self.endpoint)
            .query(&[("name", name), ("type", "CAA")])
            .header("accept", "application/dns-json")
            .send();

        let response = match timeout(self.call_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(format!("request failed: {e}")),
            Err(_) => {
                return Err(format!(
                    "no answer within {}ms",
                    self.call_timeout.as_millis()
                ))
            }
        };

        if !response.status().is_success() {
            return Err(format!("resolver answered HTTP {}", response.status()));
        }

        let body: DohResponse = match timeout(self.call_timeout, response.json()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(format!("bad answer body: {e}")),
            Err(_) => return Err("answer body timed out".into()),
        };

        match body.status {
            DOH_NOERROR | DOH_NXDOMAIN => Ok(body
                .answer
                .iter()
                .filter(|a| a.rr_type == CAA_TYPE)
                .filter_map(|a| parse_caa_data(&a.data))
                .collect()),
            code => Err(format!("resolver answered rcode {code}")),
        }
    }
}

#[async_trait]
impl CaaProxyLookup for CdrClient {
    async fn lookup_caa(&self, name: &str) -> ProxyConsensus {
        let lookups = self
            .proxies
            .iter()
            .map(|proxy| async move { (proxy.label.clone(), self.query_proxy(proxy, name).await) });
        let answers = join_all(lookups).await;

        let consensus = reconcile(self.proxies.len(), self.max_failures, answers);
        debug!(
            name,
            ok = consensus.outcome.is_ok(),
            sources = consensus.sources.len(),
            "distributed CAA lookup"
        );
        consensus
    }
}

/// Reconcile per-proxy answers into one record set.
///
/// The aggregate is accepted only when the largest group of identical
/// answers has at least `set_size - max_failures` members; unreachable
/// proxies and disagreements both count against that bound.
pub(crate) fn reconcile(
    set_size: usize,
    max_failures: usize,
    answers: Vec<(String, std::result::Result<Vec<CaaRecord>, String>)>,
) -> ProxyConsensus {
    let required = set_size.saturating_sub(max_failures);
    let mut sources = Vec::with_capacity(answers.len());
    let mut groups: HashMap<String, (usize, Vec<CaaRecord>)> = HashMap::new();

    for (label, result) in answers {
        match result {
            Ok(records) => {
                sources.push(CaaSourceOutcome {
                    source: label,
                    ok: true,
                    detail: None,
                });
                let entry = groups
                    .entry(canonical_set(&records))
                    .or_insert_with(|| (0, records));
                entry.0 += 1;
            }
            Err(detail) => {
                sources.push(CaaSourceOutcome {
                    source: label,
                    ok: false,
                    detail: Some(detail),
                });
            }
        }
    }

    let best = groups.into_values().max_by_key(|(count, _)| *count);
    let outcome = match best {
        Some((agreeing, records)) if agreeing >= required => Ok(records),
        Some((agreeing, _)) => Err(CdrError::Quorum { agreeing, required }),
        None => Err(CdrError::Quorum {
            agreeing: 0,
            required,
        }),
    };

    ProxyConsensus { sources, outcome }
}

fn canonical_set(records: &[CaaRecord]) -> String {
    let mut keys: Vec<String> = records.iter().map(CaaRecord::canonical).collect();
    keys.sort();
    keys.join("\n")
}

/// Parse one CAA record from DoH presentation format:
/// `0 issue "ca.example.net"`.
fn parse_caa_data(data: &str) -> Option<CaaRecord> {
    let mut parts = data.splitn(3, ' ');
    let flags: u8 = parts.next()?.parse().ok()?;
    let tag = parts.next()?;
    let value = parts.next()?.trim().trim_matches('"');
    Some(CaaRecord::new(tag, value, flags & 0x80 != 0))
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rr_type: u16,
    data: String,
}
