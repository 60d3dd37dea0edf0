//! Template simulator service
//!
//! Rebuilds node templates from a cluster state file on a fixed interval
//! and serves them, together with drain verdicts, health and metrics, over
//! HTTP.

pub mod api;
pub mod config;
pub mod service;

pub use config::SimulatorConfig;
pub use service::{DrainOutcome, SimulatorService};
