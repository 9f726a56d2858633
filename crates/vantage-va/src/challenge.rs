//! Challenge-type proof checks for the local perspective.
//!
//! One [`ChallengeCheck`] implementation per challenge type; the
//! orchestrator selects by the request's declared type and only depends on
//! the trait. Every network, protocol, or content failure is reported as a
//! [`Problem`] — no outcome is silently dropped.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use vantage_core::{Problem, ValidationRequest};
use vantage_dns::{DnsErrorKind, DnsLookup};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

/// Well-known path prefix for HTTP-01 proofs (RFC 8555)
const WELL_KNOWN_PATH: &str = "/.well-known/acme-challenge";

/// ALPN protocol name for TLS-ALPN-01 (RFC 8737)
const ACME_TLS_ALPN: &[u8] = b"acme-tls/1";

/// OID of the acmeIdentifier certificate extension (RFC 8737)
const ACME_IDENTIFIER_OID: &str = "1.3.6.1.5.5.7.1.31";

/// One challenge type's proof check, run from the local perspective
#[async_trait]
pub trait ChallengeCheck: Send + Sync {
    /// Verify the proof artifact for `req`. `Err` carries the
    /// caller-facing problem detail.
    async fn check(&self, req: &ValidationRequest) -> Result<(), Problem>;
}

/// RFC 8555 digest of a key authorization:
/// base64url(SHA-256(key_authorization)), no padding.
#[must_use]
pub fn key_authorization_digest(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(key_authorization_sha256(key_authorization))
}

fn key_authorization_sha256(key_authorization: &str) -> Vec<u8> {
    ring::digest::digest(&ring::digest::SHA256, key_authorization.as_bytes())
        .as_ref()
        .to_vec()
}

/// Pick the address a challenge connection should use
fn preferred_address(domain: &str, addrs: &[IpAddr]) -> Result<IpAddr, Problem> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Problem::dns(format!("no usable address for {domain}")))
}

/// HTTP-01: fetch the token file over plain HTTP and compare it to the
/// key authorization.
pub struct Http01Check {
    dns: Arc<dyn DnsLookup>,
    port: u16,
    user_agent: String,
    timeout: Duration,
}

impl Http01Check {
    /// Create the check with the configured proof port
    #[must_use]
    pub fn new(
        dns: Arc<dyn DnsLookup>,
        port: u16,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            dns,
            port,
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ChallengeCheck for Http01Check {
    async fn check(&self, req: &ValidationRequest) -> Result<(), Problem> {
        let addrs = self.dns.lookup_ips(&req.domain).await.map_err(Problem::from)?;
        let ip = preferred_address(&req.domain, &addrs.records)?;

        // Pin the connection to the address our resolver produced, so the
        // loopback/link-local policy cannot be bypassed by a second
        // resolution inside the HTTP client.
        let client = reqwest::Client::builder()
            .resolve(&req.domain, SocketAddr::new(ip, 0))
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Problem::internal(format!("http client setup: {e}")))?;

        let url = format!(
            "http://{}:{}{}/{}",
            req.domain, self.port, WELL_KNOWN_PATH, req.token
        );
        debug!(url, ip = %ip, "fetching http-01 proof");

        let response = client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Problem::connection(format!("timed out fetching {url}"))
            } else if e.is_connect() {
                Problem::connection(format!(
                    "could not connect to {}:{} for {url}",
                    req.domain, self.port
                ))
            } else {
                Problem::connection(format!("fetching {url}: {e}"))
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Problem::unauthorized(format!(
                "fetching {url}: unexpected status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Problem::connection(format!("reading {url}: {e}")))?;
        if body.trim_end() != req.key_authorization {
            return Err(Problem::unauthorized(format!(
                "content served at {url} does not match the key authorization"
            )));
        }
        Ok(())
    }
}

/// DNS-01: look for the key-authorization digest in a TXT record at
/// `_acme-challenge.<domain>`.
pub struct Dns01Check {
    dns: Arc<dyn DnsLookup>,
}

impl Dns01Check {
    /// Create the check
    #[must_use]
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl ChallengeCheck for Dns01Check {
    async fn check(&self, req: &ValidationRequest) -> Result<(), Problem> {
        // Wildcard orders prove control of the base name.
        let base = req.domain.trim_start_matches("*.");
        let name = format!("_acme-challenge.{base}");
        let expected = key_authorization_digest(&req.key_authorization);
        debug!(name, "checking dns-01 proof");

        match self.dns.lookup_txt(&name).await {
            Ok(outcome) => {
                if outcome.records.iter().any(|txt| txt == &expected) {
                    Ok(())
                } else {
                    Err(Problem::unauthorized(format!(
                        "none of the {} TXT records at {name} match the expected digest",
                        outcome.records.len()
                    )))
                }
            }
            Err(err) if matches!(err.kind, DnsErrorKind::NxDomain | DnsErrorKind::Empty) => Err(
                Problem::unauthorized(format!("no TXT records found at {name}")),
            ),
            Err(err) => Err(err.into()),
        }
    }
}

/// TLS-ALPN-01: handshake with ALPN `acme-tls/1` and verify the
/// self-signed proof certificate's SAN and acmeIdentifier extension.
pub struct TlsAlpn01Check {
    dns: Arc<dyn DnsLookup>,
    port: u16,
    timeout: Duration,
}

impl TlsAlpn01Check {
    /// Create the check with the configured TLS proof port
    #[must_use]
    pub fn new(dns: Arc<dyn DnsLookup>, port: u16, timeout: Duration) -> Self {
        Self { dns, port, timeout }
    }
}

#[async_trait]
impl ChallengeCheck for TlsAlpn01Check {
    async fn check(&self, req: &ValidationRequest) -> Result<(), Problem> {
        let addrs = self.dns.lookup_ips(&req.domain).await.map_err(Problem::from)?;
        let ip = preferred_address(&req.domain, &addrs.records)?;
        let addr = SocketAddr::new(ip, self.port);
        debug!(domain = %req.domain, %addr, "starting tls-alpn-01 handshake");

        let tcp = match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Problem::connection(format!("could not connect to {addr}: {e}")))
            }
            Err(_) => return Err(Problem::connection(format!("timed out connecting to {addr}"))),
        };

        ensure_crypto_provider();
        let mut config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ProofCertVerifier::new()))
            .with_no_client_auth();
        config.alpn_protocols = vec![ACME_TLS_ALPN.to_vec()];
        let connector = TlsConnector::from(Arc::new(config));

        let server_name = ServerName::try_from(req.domain.clone())
            .map_err(|_| Problem::malformed(format!("{} is not a valid server name", req.domain)))?;

        let tls = match timeout(self.timeout, connector.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Problem::tls(format!("handshake with {addr} failed: {e}"))),
            Err(_) => return Err(Problem::tls(format!("handshake with {addr} timed out"))),
        };

        let (_, session) = tls.get_ref();
        if session.alpn_protocol() != Some(ACME_TLS_ALPN) {
            return Err(Problem::tls(format!(
                "{} did not negotiate the acme-tls/1 protocol",
                req.domain
            )));
        }

        let certs = session
            .peer_certificates()
            .filter(|certs| !certs.is_empty())
            .ok_or_else(|| Problem::tls(format!("{} presented no certificate", req.domain)))?;
        verify_proof_certificate(
            certs[0].as_ref(),
            &req.domain,
            &key_authorization_sha256(&req.key_authorization),
        )
    }
}

/// Check the SAN and acmeIdentifier extension of a TLS-ALPN-01 proof
/// certificate.
fn verify_proof_certificate(der: &[u8], domain: &str, digest: &[u8]) -> Result<(), Problem> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Problem::tls(format!("unparseable proof certificate: {e}")))?;

    let san_matches = match cert.subject_alternative_name() {
        Ok(Some(san)) => san.value.general_names.iter().any(
            |name| matches!(name, GeneralName::DNSName(d) if d.eq_ignore_ascii_case(domain)),
        ),
        _ => false,
    };
    if !san_matches {
        return Err(Problem::tls(format!(
            "proof certificate does not name {domain}"
        )));
    }

    let Some(ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == ACME_IDENTIFIER_OID)
    else {
        return Err(Problem::tls(
            "proof certificate lacks the acmeIdentifier extension".to_string(),
        ));
    };

    // The extension value is a DER OCTET STRING holding the 32-byte digest.
    let value = ext.value;
    if value.len() != 34 || value[0] != 0x04 || value[1] != 0x20 {
        return Err(Problem::tls(
            "malformed acmeIdentifier extension in proof certificate".to_string(),
        ));
    }
    if &value[2..] != digest {
        return Err(Problem::unauthorized(
            "acmeIdentifier digest does not match the key authorization".to_string(),
        ));
    }
    Ok(())
}

/// Initialize the rustls `CryptoProvider` (once).
///
/// `install_default` returns `Err` only when a provider is already set,
/// which is fine.
fn ensure_crypto_provider() {
    let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
}

/// Accepts any certificate chain during the TLS-ALPN-01 handshake.
///
/// The proof certificate is self-signed, so chain verification proves
/// nothing here; identity comes from the SAN and acmeIdentifier checks
/// performed after the handshake. Handshake signatures are still verified.
#[derive(Debug)]
struct ProofCertVerifier {
    provider: CryptoProvider,
}

impl ProofCertVerifier {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
}

impl ServerCertVerifier for ProofCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
