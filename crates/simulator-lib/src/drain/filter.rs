//! kubectl-drain style pod filtering

use super::pdb::has_matching_pdb;
use super::{BlockingPod, BlockingPodReason, DrainError, DrainMode, DrainOptions};
use crate::models::{pod_name, pod_namespace};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";
pub const SAFE_TO_EVICT_ANNOTATION: &str = "cluster-autoscaler.kubernetes.io/safe-to-evict";

const KUBE_SYSTEM: &str = "kube-system";
const DEFAULT_TERMINATION_GRACE_PERIOD_SECS: i64 = 30;
/// Extra time after the grace period before a terminating pod is ignored
const LONG_TERMINATING_EXTRA_SECS: i64 = 30;

/// Decides which of a node's pods must be moved before it can drain
pub trait DrainFilter: Send + Sync {
    fn pods_for_deletion(
        &self,
        pods: &[Pod],
        pdbs: &[PodDisruptionBudget],
        options: &DrainOptions,
        mode: &DrainMode<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, DrainError>;
}

/// The rules `kubectl drain` applies, plus controller lookups in detailed
/// mode
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDrainFilter;

impl DrainFilter for DefaultDrainFilter {
    fn pods_for_deletion(
        &self,
        pods: &[Pod],
        pdbs: &[PodDisruptionBudget],
        options: &DrainOptions,
        mode: &DrainMode<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Pod>, DrainError> {
        let mut result = Vec::new();
        for pod in pods {
            if is_mirror_pod(pod) || is_long_terminating(pod, now) {
                continue;
            }

            let ownership = check_controller(pod, mode)?;
            if ownership == Ownership::DaemonSet {
                continue;
            }

            if !has_safe_to_evict_annotation(pod) && !is_terminal(pod) {
                let key = format!("{}/{}", pod_namespace(pod), pod_name(pod));
                if ownership == Ownership::None {
                    return Err(block(
                        pod,
                        BlockingPodReason::UnreplicatedController,
                        format!("{} is not replicated", key),
                    ));
                }
                if pod_namespace(pod) == KUBE_SYSTEM && options.skip_nodes_with_system_pods {
                    let covered = match has_matching_pdb(pod, pdbs) {
                        Ok(covered) => covered,
                        Err(err) => {
                            return Err(block(
                                pod,
                                BlockingPodReason::UnexpectedError,
                                format!("error matching disruption budgets for {}: {}", key, err),
                            ))
                        }
                    };
                    if !covered {
                        return Err(block(
                            pod,
                            BlockingPodReason::UnmovableSystemPod,
                            format!(
                                "non-daemonset, non-mirrored, non-pdb-assigned kube-system pod present: {}",
                                pod_name(pod)
                            ),
                        ));
                    }
                }
                if options.skip_nodes_with_local_storage && has_local_storage(pod) {
                    return Err(block(
                        pod,
                        BlockingPodReason::LocalStorageRequested,
                        format!("pod with local storage present: {}", pod_name(pod)),
                    ));
                }
                if has_not_safe_to_evict_annotation(pod) {
                    return Err(block(
                        pod,
                        BlockingPodReason::NotSafeToEvictAnnotation,
                        format!("pod annotated as not safe to evict present: {}", pod_name(pod)),
                    ));
                }
            }
            result.push(pod.clone());
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    None,
    Replicated,
    DaemonSet,
}

/// Classify the pod's controller, verifying it exists in detailed mode
fn check_controller(pod: &Pod, mode: &DrainMode<'_>) -> Result<Ownership, DrainError> {
    let Some(owner) = controller_ref(pod) else {
        return Ok(Ownership::None);
    };
    let ownership = match owner.kind.as_str() {
        "DaemonSet" => Ownership::DaemonSet,
        "ReplicationController" | "ReplicaSet" | "Job" | "StatefulSet" => Ownership::Replicated,
        _ => Ownership::None,
    };
    if ownership == Ownership::None {
        return Ok(ownership);
    }

    let DrainMode::Detailed {
        listers,
        min_replica_count,
    } = mode
    else {
        return Ok(ownership);
    };

    let key = format!("{}/{}", pod_namespace(pod), pod_name(pod));
    let kind = owner.kind.as_str();
    match listers.controller_replicas(pod_namespace(pod), owner) {
        Ok(Some(replicas)) => {
            let scalable = matches!(kind, "ReplicationController" | "ReplicaSet");
            if scalable && replicas < *min_replica_count {
                return Err(block(
                    pod,
                    BlockingPodReason::MinReplicasReached,
                    format!(
                        "{} for {} has too few replicas spec: {} min: {}",
                        kind, key, replicas, min_replica_count
                    ),
                ));
            }
            Ok(ownership)
        }
        Ok(None) => Err(block(
            pod,
            BlockingPodReason::ControllerNotFound,
            format!("{} for {} is not present", kind, key),
        )),
        Err(err) => Err(block(
            pod,
            BlockingPodReason::UnexpectedError,
            format!("{} for {} is not available: {}", kind, key, err),
        )),
    }
}

fn block(pod: &Pod, reason: BlockingPodReason, message: String) -> DrainError {
    DrainError::blocked(BlockingPod::new(pod.clone(), reason), message)
}

/// Owner reference flagged as the managing controller
pub fn controller_ref(pod: &Pod) -> Option<&OwnerReference> {
    pod.metadata
        .owner_references
        .as_deref()?
        .iter()
        .find(|o| o.controller == Some(true))
}

pub fn is_mirror_pod(pod: &Pod) -> bool {
    annotation(pod, MIRROR_POD_ANNOTATION).is_some()
}

fn is_terminal(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

/// Pod marked for deletion for longer than its grace period plus a margin
pub fn is_long_terminating(pod: &Pod, now: DateTime<Utc>) -> bool {
    let Some(deleted_at) = pod.metadata.deletion_timestamp.as_ref() else {
        return false;
    };
    let grace = pod
        .spec
        .as_ref()
        .and_then(|s| s.termination_grace_period_seconds)
        .unwrap_or(DEFAULT_TERMINATION_GRACE_PERIOD_SECS);
    now > deleted_at.0 + Duration::seconds(grace + LONG_TERMINATING_EXTRA_SECS)
}

/// Pod mounts an emptyDir or hostPath volume
pub fn has_local_storage(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_deref())
        .unwrap_or_default()
        .iter()
        .any(|v| v.empty_dir.is_some() || v.host_path.is_some())
}

fn has_safe_to_evict_annotation(pod: &Pod) -> bool {
    annotation(pod, SAFE_TO_EVICT_ANNOTATION) == Some("true")
}

fn has_not_safe_to_evict_annotation(pod: &Pod) -> bool {
    annotation(pod, SAFE_TO_EVICT_ANNOTATION) == Some("false")
}

fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}
