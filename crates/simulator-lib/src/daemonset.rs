//! Daemon pod projection
//!
//! Predicts which DaemonSet pods a node would run by staging the node in a
//! private snapshot and asking the predicate checker about one synthetic
//! pod per DaemonSet.

use crate::models::{node_name, pod_key, NodeInfo};
use crate::naming::{daemon_pod_name, NameSource};
use crate::resources::copy_limits_to_requests;
use crate::simulator::{
    BasicClusterSnapshot, ClusterSnapshot, PredicateChecker, PredicateError, SnapshotError,
};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaemonSetError {
    #[error("failed to stage node for daemon pod projection: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("unexpected error while calling predicate checker: {0}")]
    Predicate(PredicateError),
}

/// Daemon pods that would be admitted onto the node, in DaemonSet order.
///
/// Pods the checker rejects as not schedulable are left out. Any other
/// checker error aborts the projection.
pub fn daemonset_pods_for_node(
    node_info: &NodeInfo,
    daemonsets: &[DaemonSet],
    checker: &dyn PredicateChecker,
    names: &dyn NameSource,
) -> Result<Vec<Pod>, DaemonSetError> {
    let mut snapshot = BasicClusterSnapshot::new();
    snapshot.add_node_with_pods(node_info.node.clone(), node_info.pods.clone())?;
    let node = node_name(&node_info.node);

    let mut result = Vec::new();
    for ds in daemonsets {
        let pod = new_daemon_pod(ds, node, names);
        match checker.check_predicates(&snapshot, &pod, node) {
            Ok(()) => result.push(pod),
            Err(err) if err.is_not_schedulable() => {
                trace!(pod = %pod_key(&pod), node = %node, error = %err, "Skipping daemon pod");
            }
            Err(err) => return Err(DaemonSetError::Predicate(err)),
        }
    }
    Ok(result)
}

/// Synthetic pod for a DaemonSet, bound to `node`
pub fn new_daemon_pod(ds: &DaemonSet, node: &str, names: &dyn NameSource) -> Pod {
    let template = ds.spec.as_ref().map(|s| &s.template);
    let mut spec = template
        .and_then(|t| t.spec.clone())
        .unwrap_or_default();
    copy_limits_to_requests(&mut spec);
    spec.node_name = Some(node.to_string());

    let mut metadata = template
        .and_then(|t| t.metadata.clone())
        .unwrap_or_default();
    metadata.namespace = ds.metadata.namespace.clone();
    metadata.name = Some(daemon_pod_name(
        ds.metadata.name.as_deref().unwrap_or_default(),
        names,
    ));

    Pod {
        metadata,
        spec: Some(spec),
        status: None,
    }
}
