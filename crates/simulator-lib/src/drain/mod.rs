//! Drain eligibility
//!
//! Decides which pods must move off a node before it can be removed, or
//! names the single pod that makes the drain unsafe.
//!
//! Evaluation order, first failure wins:
//! 1. Pods owned by a batch Job
//! 2. The [`DrainFilter`] rules
//! 3. Disruption budgets of the pods that would move

mod filter;
mod pdb;

#[cfg(test)]
mod tests;

pub use filter::{
    controller_ref, has_local_storage, is_long_terminating, is_mirror_pod, DefaultDrainFilter,
    DrainFilter, MIRROR_POD_ANNOTATION, SAFE_TO_EVICT_ANNOTATION,
};
pub use pdb::{check_job_pods, check_pdbs};

use crate::labels::SelectorError;
use crate::listers::{ListerError, ListerRegistry};
use crate::models::{pod_key, pod_node_name};
use crate::observability::{EventLogger, SimulatorMetrics};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Why a drain cannot proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPodReason {
    UnreplicatedController,
    InsufficientDisruptionBudget,
    ControllerNotFound,
    MinReplicasReached,
    LocalStorageRequested,
    NotSafeToEvictAnnotation,
    UnmovableSystemPod,
    UnexpectedError,
}

impl BlockingPodReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockingPodReason::UnreplicatedController => "unreplicated_controller",
            BlockingPodReason::InsufficientDisruptionBudget => "insufficient_disruption_budget",
            BlockingPodReason::ControllerNotFound => "controller_not_found",
            BlockingPodReason::MinReplicasReached => "min_replicas_reached",
            BlockingPodReason::LocalStorageRequested => "local_storage_requested",
            BlockingPodReason::NotSafeToEvictAnnotation => "not_safe_to_evict_annotation",
            BlockingPodReason::UnmovableSystemPod => "unmovable_system_pod",
            BlockingPodReason::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for BlockingPodReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pod that stopped a drain, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockingPod {
    pub pod: Pod,
    pub reason: BlockingPodReason,
}

impl BlockingPod {
    pub fn new(pod: Pod, reason: BlockingPodReason) -> Self {
        Self { pod, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrainError {
    /// A pod prevents the drain
    #[error("{message}")]
    Blocked {
        blocking: Box<BlockingPod>,
        message: String,
    },
    /// A disruption budget carries a selector that cannot be evaluated
    #[error("invalid disruption budget selector: {0}")]
    Selector(#[from] SelectorError),
    /// The node's pods could not be listed
    #[error("api call error: {0}")]
    ApiCall(#[from] ListerError),
}

impl DrainError {
    pub fn blocked(pod: BlockingPod, message: impl Into<String>) -> Self {
        DrainError::Blocked {
            blocking: Box::new(pod),
            message: message.into(),
        }
    }

    pub fn blocking_pod(&self) -> Option<&BlockingPod> {
        match self {
            DrainError::Blocked { blocking, .. } => Some(blocking),
            _ => None,
        }
    }
}

/// How thoroughly pod ownership is verified
#[derive(Clone, Copy)]
pub enum DrainMode<'a> {
    /// Trust owner references as they are
    Fast,
    /// Look each controller up and require a minimum replica count for
    /// replication controllers and replica sets
    Detailed {
        listers: &'a dyn ListerRegistry,
        min_replica_count: i32,
    },
}

impl DrainMode<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainMode::Fast => "fast",
            DrainMode::Detailed { .. } => "detailed",
        }
    }
}

impl std::fmt::Debug for DrainMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrainMode::Fast => f.write_str("Fast"),
            DrainMode::Detailed {
                min_replica_count, ..
            } => f
                .debug_struct("Detailed")
                .field("min_replica_count", min_replica_count)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOptions {
    /// Block on kube-system pods not covered by a disruption budget
    pub skip_nodes_with_system_pods: bool,
    /// Block on pods with emptyDir or hostPath volumes
    pub skip_nodes_with_local_storage: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            skip_nodes_with_system_pods: true,
            skip_nodes_with_local_storage: true,
        }
    }
}

/// Drain eligibility checks for a node's pods
pub struct DrainEvaluator {
    options: DrainOptions,
    filter: Arc<dyn DrainFilter>,
    metrics: Option<SimulatorMetrics>,
    logger: EventLogger,
}

impl DrainEvaluator {
    pub fn new(options: DrainOptions) -> Self {
        Self {
            options,
            filter: Arc::new(DefaultDrainFilter),
            metrics: None,
            logger: EventLogger::default(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn DrainFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_logger(mut self, logger: EventLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn options(&self) -> &DrainOptions {
        &self.options
    }

    /// Pods that must move if the node holding `pods` drains, in input
    /// order.
    ///
    /// Fails with exactly one blocking pod when the drain is unsafe.
    pub fn pods_to_move(
        &self,
        pods: &[Pod],
        mode: DrainMode<'_>,
        pdbs: &[PodDisruptionBudget],
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, DrainError> {
        let result = self.evaluate(pods, &mode, pdbs, now);
        self.record(&mode, &result);
        result
    }

    /// Same as [`Self::pods_to_move`] for the pods the listers report on
    /// `node`
    pub fn node_pods_to_move(
        &self,
        node: &str,
        listers: &dyn ListerRegistry,
        mode: DrainMode<'_>,
        pdbs: &[PodDisruptionBudget],
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, DrainError> {
        let pods: Vec<Pod> = listers
            .scheduled_pods()?
            .into_iter()
            .filter(|p| pod_node_name(p) == Some(node))
            .collect();
        self.pods_to_move(&pods, mode, pdbs, now)
    }

    fn evaluate(
        &self,
        pods: &[Pod],
        mode: &DrainMode<'_>,
        pdbs: &[PodDisruptionBudget],
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, DrainError> {
        check_job_pods(pods)?;
        let movable = self
            .filter
            .pods_for_deletion(pods, pdbs, &self.options, mode, now)?;
        check_pdbs(&movable, pdbs)?;
        Ok(movable)
    }

    fn record(&self, mode: &DrainMode<'_>, result: &Result<Vec<Pod>, DrainError>) {
        let outcome = match result {
            Ok(_) => "movable",
            Err(DrainError::Blocked { .. }) => "blocked",
            Err(_) => "error",
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_drain_evaluations(mode.as_str(), outcome);
        }

        if let Err(DrainError::Blocked { blocking, message }) = result {
            let node = pod_node_name(&blocking.pod).unwrap_or_default();
            self.logger
                .log_drain_blocked(node, &pod_key(&blocking.pod), blocking.reason.as_str(), message);
            if let Some(metrics) = &self.metrics {
                metrics.inc_drain_blocked(blocking.reason.as_str());
            }
        }
    }
}

impl Default for DrainEvaluator {
    fn default() -> Self {
        Self::new(DrainOptions::default())
    }
}

impl std::fmt::Debug for DrainEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainEvaluator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Pods to move, trusting owner references
pub fn fast_pods_to_move(
    pods: &[Pod],
    skip_nodes_with_system_pods: bool,
    skip_nodes_with_local_storage: bool,
    pdbs: &[PodDisruptionBudget],
    now: DateTime<Utc>,
) -> Result<Vec<Pod>, DrainError> {
    DrainEvaluator::new(DrainOptions {
        skip_nodes_with_system_pods,
        skip_nodes_with_local_storage,
    })
    .pods_to_move(pods, DrainMode::Fast, pdbs, now)
}

/// Pods to move, verifying every controller through `listers`
pub fn detailed_pods_to_move(
    pods: &[Pod],
    skip_nodes_with_system_pods: bool,
    skip_nodes_with_local_storage: bool,
    listers: &dyn ListerRegistry,
    min_replica_count: i32,
    pdbs: &[PodDisruptionBudget],
    now: DateTime<Utc>,
) -> Result<Vec<Pod>, DrainError> {
    DrainEvaluator::new(DrainOptions {
        skip_nodes_with_system_pods,
        skip_nodes_with_local_storage,
    })
    .pods_to_move(
        pods,
        DrainMode::Detailed {
            listers,
            min_replica_count,
        },
        pdbs,
        now,
    )
}
