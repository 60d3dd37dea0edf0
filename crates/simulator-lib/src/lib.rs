//! Node template synthesis and drain simulation for a cluster autoscaler
//!
//! This crate provides the core functionality for:
//! - Node readiness evaluation
//! - DaemonSet pod projection onto candidate nodes
//! - Per node group template synthesis with a template cache
//! - Drain eligibility with disruption budget checks
//! - Health checks and observability

pub mod cloudprovider;
pub mod clusterstate;
pub mod daemonset;
pub mod drain;
pub mod errors;
pub mod health;
pub mod labels;
pub mod listers;
pub mod models;
pub mod naming;
pub mod observability;
pub mod readiness;
pub mod resources;
pub mod simulator;
pub mod taints;
pub mod template;

pub use clusterstate::{node_readiness, ClusterState, ClusterStateError, NodeReadiness};
pub use daemonset::daemonset_pods_for_node;
pub use drain::{
    detailed_pods_to_move, fast_pods_to_move, BlockingPod, BlockingPodReason, DrainError,
    DrainEvaluator, DrainMode, DrainOptions,
};
pub use errors::{AutoscalerError, ErrorKind};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, PassSummary,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{EventLogger, SimulatorMetrics, TemplateSource};
pub use readiness::{is_node_ready_and_schedulable, readiness_state, ReadinessState};
pub use template::{pods_for_nodes, suppressor_for_provider, TemplateSynthesizer};
