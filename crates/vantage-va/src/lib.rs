//! Multi-perspective domain-control validation.
//!
//! Before a certificate is issued for a domain, this engine proves the
//! requester controls it, checks that no CAA record forbids this CA from
//! issuing, consults a malware/phishing reputation gate, and corroborates
//! the local decision from independent network vantage points to resist
//! localized routing attacks.
//!
//! # Architecture
//!
//! - [`challenge`] — one proof check per challenge type (HTTP-01, DNS-01,
//!   TLS-ALPN-01), selected by the request
//! - [`caa`] — CAA tree climbing and issuer matching, optionally through
//!   a distributed resolver
//! - [`reputation`] — fail-open blocklist gate
//! - [`remote`] — clients for the peer VA set and the corroboration
//!   fan-out
//! - [`engine`] — the orchestrator tying it together into one verdict per
//!   request

pub mod caa;
pub mod challenge;
pub mod engine;
pub mod remote;
pub mod reputation;

pub use caa::CaaEvaluator;
pub use challenge::{
    key_authorization_digest, ChallengeCheck, Dns01Check, Http01Check, TlsAlpn01Check,
};
pub use engine::ValidationAuthority;
pub use remote::{corroborate, RemoteVa, RemoteValidationResponse, RPC_PATH};
pub use reputation::{DisabledReputation, DomainReputation, HttpReputation, ReputationVerdict};
