//! Multi-perspective domain-control validation engine for certificate
//! authorities.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vantage::{
//!     ChallengeKind, DisabledReputation, Resolver, VaConfig, ValidationAuthority,
//!     ValidationRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> vantage::Result<()> {
//!     let config = VaConfig::load(std::path::Path::new("va.toml"))?;
//!     let resolver = Arc::new(Resolver::new(&config.dns)?);
//!     let va = ValidationAuthority::new(
//!         config,
//!         resolver,
//!         Arc::new(DisabledReputation),
//!         None,
//!     )?;
//!
//!     let verdict = va
//!         .perform_validation(&ValidationRequest {
//!             domain: "example.com".into(),
//!             challenge: ChallengeKind::Http01,
//!             account_uri: "acct:1".into(),
//!             token: "token".into(),
//!             key_authorization: "token.thumbprint".into(),
//!             wildcard: false,
//!         })
//!         .await;
//!
//!     println!("authorized: {}", verdict.success);
//!     Ok(())
//! }
//! ```

// Re-export core types
pub use vantage_core::*;

// Re-export the resolver
pub use vantage_dns::{DnsError, DnsErrorKind, DnsLookup, DnsOutcome, HostList, Resolver};

// Re-export the distributed CAA resolver
pub use vantage_cdr::{CaaProxyLookup, CdrClient, CdrError, ProxyConsensus};

// Re-export the engine
pub use vantage_va::{
    CaaEvaluator, ChallengeCheck, DisabledReputation, DomainReputation, HttpReputation,
    RemoteVa, ReputationVerdict, ValidationAuthority,
};

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;
