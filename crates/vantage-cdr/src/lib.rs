//! Distributed CAA resolution across independent vantage points.
//!
//! An attacker who controls routing to a single vantage point could spoof
//! a permissive CAA answer. This crate repeats the lookup through a set of
//! independent proxies and accepts the aggregate only when enough of them
//! agree; too many unreachable or disagreeing proxies fails closed.

mod client;

use async_trait::async_trait;
use thiserror::Error;
use vantage_core::{CaaRecord, CaaSourceOutcome};

pub use client::CdrClient;

/// Failure of the aggregate distributed lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdrError {
    /// Not enough vantage points agreed within the timeout budget
    #[error("distributed CAA quorum not met: {agreeing} agreeing vantage points, {required} required")]
    Quorum {
        /// Size of the largest agreeing group
        agreeing: usize,
        /// Minimum agreeing group size to accept
        required: usize,
    },
}

/// Aggregate answer from the proxy set
#[derive(Debug, Clone)]
pub struct ProxyConsensus {
    /// Per-proxy outcomes, in configuration order
    pub sources: Vec<CaaSourceOutcome>,
    /// Reconciled record set, or the quorum failure
    pub outcome: Result<Vec<CaaRecord>, CdrError>,
}

/// Distributed CAA lookup capability consumed by the CAA evaluator
#[async_trait]
pub trait CaaProxyLookup: Send + Sync {
    /// Query every vantage point for the CAA set at `name` and reconcile
    async fn lookup_caa(&self, name: &str) -> ProxyConsensus;
}
