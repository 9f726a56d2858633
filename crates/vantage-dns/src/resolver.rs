//! Bounded-retry resolver over hickory.
//!
//! Retries only transient failure classes (timeout, transport errors) up
//! to the configured try count; NXDOMAIN and well-formed empty answers are
//! terminal. Nothing here is cached across requests: authority freshness
//! matters more than performance on a validation path.

use crate::error::{DnsError, DnsErrorKind};
use crate::hostlist::HostList;
use crate::{DnsLookup, DnsOutcome};
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::{op::ResponseCode, rr::RecordType, ProtoErrorKind},
    ResolveError, TokioResolver,
};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;
use vantage_core::{config::DnsConfig, CaaRecord, Result};

/// Resolver with per-attempt timeout, bounded retry, and answer policy.
///
/// The production variant rejects answers resolving to loopback or
/// link-local addresses; `allow_loopback` relaxes that for test
/// environments only.
pub struct Resolver {
    inner: TokioResolver,
    attempt_timeout: Duration,
    tries: u32,
    allow_loopback: bool,
    servfail_exceptions: HostList,
}

impl Resolver {
    /// Build a resolver from configuration. Loads the SERVFAIL exception
    /// list, so a malformed list fails here, at startup.
    pub fn new(config: &DnsConfig) -> Result<Self> {
        let servfail_exceptions = match &config.servfail_exceptions {
            Some(path) => HostList::load(path)?,
            None => HostList::default(),
        };
        let inner = build_inner(config.resolver.as_deref(), config.timeout())?;
        Ok(Self {
            inner,
            attempt_timeout: config.timeout(),
            tries: config.tries(),
            allow_loopback: config.allow_loopback,
            servfail_exceptions,
        })
    }

    /// Run one query op under the retry policy.
    ///
    /// `op` performs a single attempt and returns either records or an
    /// already-classified failure. Attempts are counted across retries and
    /// reported in the outcome either way.
    async fn run<T, F, Fut>(&self, query: &str, mut op: F) -> std::result::Result<DnsOutcome<T>, DnsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, (DnsErrorKind, String)>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let started = Instant::now();
            let result = match timeout(self.attempt_timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err((
                    DnsErrorKind::Timeout,
                    format!("no answer within {}ms", self.attempt_timeout.as_millis()),
                )),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(records) => {
                    debug!(query, attempts, elapsed_ms, records = records.len(), "dns query ok");
                    return Ok(DnsOutcome { records, attempts });
                }
                Err((kind, detail)) => {
                    if kind.is_transient() && attempts < self.tries {
                        debug!(query, %kind, attempts, elapsed_ms, "transient dns failure, retrying");
                        continue;
                    }
                    debug!(query, %kind, attempts, elapsed_ms, "dns query failed");
                    return Err(DnsError::new(kind, query, detail, attempts));
                }
            }
        }
    }
}

#[async_trait]
impl DnsLookup for Resolver {
    async fn lookup_ips(&self, host: &str) -> std::result::Result<DnsOutcome<IpAddr>, DnsError> {
        let outcome = self
            .run(host, || async {
                self.inner
                    .lookup_ip(host)
                    .await
                    .map(|answer| answer.iter().collect::<Vec<_>>())
                    .map_err(|e| classify(&e))
            })
            .await?;

        if let Some(ip) = forbidden_answer(self.allow_loopback, &outcome.records) {
            return Err(DnsError::new(
                DnsErrorKind::Rejected,
                host,
                format!("answer {ip} is a loopback or link-local address"),
                outcome.attempts,
            ));
        }
        Ok(outcome)
    }

    async fn lookup_txt(&self, name: &str) -> std::result::Result<DnsOutcome<String>, DnsError> {
        self.run(name, || async {
            self.inner
                .txt_lookup(name)
                .await
                .map(|answer| {
                    answer
                        .iter()
                        .map(|txt| {
                            txt.iter()
                                .map(|data| String::from_utf8_lossy(data).to_string())
                                .collect::<String>()
                        })
                        .collect()
                })
                .map_err(|e| classify(&e))
        })
        .await
    }

    async fn lookup_caa(&self, name: &str) -> std::result::Result<DnsOutcome<CaaRecord>, DnsError> {
        let exempt = self.servfail_exceptions.contains(name);
        self.run(name, || async {
            match self.inner.lookup(name, RecordType::CAA).await {
                Ok(answer) => Ok(answer
                    .record_iter()
                    .filter_map(|record| record.data().as_caa().map(to_caa_record))
                    .collect()),
                Err(e) => {
                    let (kind, detail) = classify(&e);
                    if downgrade_to_empty(kind, exempt) {
                        if kind == DnsErrorKind::ServFail {
                            debug!(name, "SERVFAIL downgraded to empty CAA set (exception list)");
                        }
                        Ok(Vec::new())
                    } else {
                        Err((kind, detail))
                    }
                }
            }
        })
        .await
    }
}

/// Whether a negative CAA answer counts as "no records".
///
/// NXDOMAIN and empty answers always do (tree climbing continues above);
/// SERVFAIL does only for names on the exception list.
const fn downgrade_to_empty(kind: DnsErrorKind, exempt: bool) -> bool {
    matches!(kind, DnsErrorKind::NxDomain | DnsErrorKind::Empty)
        || (matches!(kind, DnsErrorKind::ServFail) && exempt)
}

fn to_caa_record(caa: &hickory_resolver::proto::rr::rdata::CAA) -> CaaRecord {
    CaaRecord::new(
        caa.tag().as_str(),
        String::from_utf8_lossy(caa.raw_value()).to_string(),
        caa.issuer_critical(),
    )
}

/// Classify a hickory error into our taxonomy.
///
/// Negative answers arrive as `NoRecordsFound` with the authority's
/// response code; anything else is treated as a transport problem and
/// therefore retryable.
fn classify(err: &ResolveError) -> (DnsErrorKind, String) {
    if let Some(proto) = err.proto() {
        if let ProtoErrorKind::NoRecordsFound { response_code, .. } = proto.kind() {
            let kind = match *response_code {
                ResponseCode::NXDomain => DnsErrorKind::NxDomain,
                ResponseCode::ServFail => DnsErrorKind::ServFail,
                ResponseCode::Refused => DnsErrorKind::Refused,
                _ => DnsErrorKind::Empty,
            };
            return (kind, err.to_string());
        }
    }
    (DnsErrorKind::Network, err.to_string())
}

/// Production answers must never point the validation path at ourselves
/// or the local segment; the test-mode variant relaxes this.
fn forbidden_answer(allow_loopback: bool, records: &[IpAddr]) -> Option<IpAddr> {
    if allow_loopback {
        return None;
    }
    records.iter().find(|ip| is_reserved(ip)).copied()
}

fn is_reserved(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

fn build_inner(upstream: Option<&str>, attempt_timeout: Duration) -> Result<TokioResolver> {
    let mut opts = ResolverOpts::default();
    // Retries and timeouts are handled by our own loop.
    opts.attempts = 1;
    opts.timeout = attempt_timeout;
    opts.cache_size = 0;

    let provider = TokioConnectionProvider::default();
    let config = match upstream {
        Some(addr) => {
            let (ip, port) = parse_upstream(addr)?;
            ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from_ips_clear(&[ip], port, true),
            )
        }
        None => ResolverConfig::default(),
    };
    Ok(TokioResolver::builder_with_config(config, provider)
        .with_options(opts)
        .build())
}

fn parse_upstream(addr: &str) -> Result<(IpAddr, u16)> {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Ok((sock.ip(), sock.port()));
    }
    addr.parse::<IpAddr>()
        .map(|ip| (ip, 53))
        .map_err(|_| vantage_core::VaError::Config(format!("invalid dns resolver address {addr}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn resolver_with_tries(tries: i64) -> Resolver {
        let config = DnsConfig {
            tries,
            timeout_ms: 200,
            ..DnsConfig::default()
        };
        Resolver::new(&config).unwrap()
    }

    #[test]
    fn test_parse_upstream_forms() {
        assert_eq!(
            parse_upstream("127.0.0.1:8053").unwrap(),
            ("127.0.0.1".parse().unwrap(), 8053)
        );
        assert_eq!(
            parse_upstream("10.0.0.53").unwrap(),
            ("10.0.0.53".parse().unwrap(), 53)
        );
        assert!(parse_upstream("not-an-address").is_err());
    }

    #[test]
    fn test_is_reserved() {
        assert!(is_reserved(&"127.0.0.1".parse().unwrap()));
        assert!(is_reserved(&"169.254.1.1".parse().unwrap()));
        assert!(is_reserved(&"::1".parse().unwrap()));
        assert!(is_reserved(&"fe80::1".parse().unwrap()));
        assert!(!is_reserved(&"93.184.216.34".parse().unwrap()));
        assert!(!is_reserved(&"2606:2800:220:1::1".parse().unwrap()));
    }

    #[test]
    fn test_production_rejects_loopback_answers_test_mode_accepts() {
        let records: Vec<IpAddr> =
            vec!["93.184.216.34".parse().unwrap(), "127.0.0.1".parse().unwrap()];
        assert_eq!(
            forbidden_answer(false, &records),
            Some("127.0.0.1".parse().unwrap())
        );
        assert_eq!(forbidden_answer(true, &records), None);
        assert_eq!(forbidden_answer(false, &["93.184.216.34".parse().unwrap()]), None);
    }

    #[test]
    fn test_downgrade_to_empty() {
        assert!(downgrade_to_empty(DnsErrorKind::NxDomain, false));
        assert!(downgrade_to_empty(DnsErrorKind::Empty, false));
        assert!(downgrade_to_empty(DnsErrorKind::ServFail, true));
        assert!(!downgrade_to_empty(DnsErrorKind::ServFail, false));
        assert!(!downgrade_to_empty(DnsErrorKind::Timeout, true));
    }

    #[tokio::test]
    async fn test_transient_errors_retried_to_exhaustion() {
        let resolver = resolver_with_tries(3);
        let calls = AtomicU32::new(0);
        let err = resolver
            .run::<IpAddr, _, _>("example.com", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err((DnsErrorKind::Network, String::from("connection refused")))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.kind, DnsErrorKind::Network);
    }

    #[tokio::test]
    async fn test_terminal_errors_not_retried() {
        let resolver = resolver_with_tries(3);
        let calls = AtomicU32::new(0);
        let err = resolver
            .run::<IpAddr, _, _>("gone.example.com", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err((DnsErrorKind::NxDomain, String::from("name does not exist"))) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let resolver = resolver_with_tries(3);
        let calls = AtomicU32::new(0);
        let outcome = resolver
            .run("example.com", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err((DnsErrorKind::Timeout, String::from("no answer")))
                    } else {
                        Ok(vec!["93.184.216.34".parse::<IpAddr>().unwrap()])
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn test_tries_clamped_to_minimum_one() {
        let resolver = resolver_with_tries(0);
        let calls = AtomicU32::new(0);
        let err = resolver
            .run::<IpAddr, _, _>("example.com", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err((DnsErrorKind::Timeout, String::from("no answer"))) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_hits_per_attempt_timeout() {
        let resolver = resolver_with_tries(2);
        let calls = AtomicU32::new(0);
        let err = resolver
            .run::<IpAddr, _, _>("slow.example.com", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Vec::new())
                }
            })
            .await
            .unwrap_err();
        // Timed out twice (200ms each), then gave up.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind, DnsErrorKind::Timeout);
    }
}
