//! Core types for the vantage multi-perspective validation engine.
//!
//! This crate provides the foundational pieces shared by the rest of the
//! workspace:
//!
//! - **Types**: validation requests, per-perspective outcomes, and the
//!   terminal [`QuorumVerdict`]
//! - **Problems**: the [`Problem`] detail attached to every failure
//! - **Configuration**: [`VaConfig`] with startup validation
//! - **Errors**: [`VaError`] for setup and wire failures

mod error;
pub mod config;
pub mod problem;
pub mod types;

pub use config::{CdrConfig, CdrMode, DnsConfig, PortConfig, RemoteVaConfig, VaConfig};
pub use error::{Result, VaError};
pub use problem::{Problem, ProblemKind};
pub use types::{
    CaaDecision, CaaRecord, CaaSourceOutcome, ChallengeKind, ChallengeOutcome, QuorumVerdict,
    RemoteFailure, ValidationRequest, ValidationState, LOCAL_PERSPECTIVE,
};
