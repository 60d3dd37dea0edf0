//! Admission predicates
//!
//! `NotSchedulable` is an expected outcome: the pod simply does not fit the
//! node. Every other error means the checker itself failed.

use super::ClusterSnapshot;
use crate::models::pod_key;
use crate::resources::{node_allocatable, pod_requests, RESOURCE_PODS};
use crate::taints::first_untolerated;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("pod {pod} does not fit on node {node}: {}", reasons.join(", "))]
    NotSchedulable {
        pod: String,
        node: String,
        reasons: Vec<String>,
    },
    #[error("predicate checker failed: {0}")]
    Internal(String),
}

impl PredicateError {
    pub fn is_not_schedulable(&self) -> bool {
        matches!(self, PredicateError::NotSchedulable { .. })
    }
}

/// Scheduler admission check for a single pod on a single node
pub trait PredicateChecker: Send + Sync {
    fn check_predicates(
        &self,
        snapshot: &dyn ClusterSnapshot,
        pod: &Pod,
        node_name: &str,
    ) -> Result<(), PredicateError>;
}

/// Node selector, taint toleration, pod count and resource fit
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPredicateChecker;

impl PredicateChecker for BasicPredicateChecker {
    fn check_predicates(
        &self,
        snapshot: &dyn ClusterSnapshot,
        pod: &Pod,
        node_name: &str,
    ) -> Result<(), PredicateError> {
        let info = snapshot.node_info(node_name).ok_or_else(|| {
            PredicateError::Internal(format!("node {} not found in snapshot", node_name))
        })?;
        let node = &info.node;
        let spec = pod.spec.as_ref();
        let mut reasons = Vec::new();

        if let Some(selector) = spec.and_then(|s| s.node_selector.as_ref()) {
            let labels = node.metadata.labels.as_ref();
            let matches = selector
                .iter()
                .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v));
            if !matches {
                reasons.push("node(s) didn't match node selector".to_string());
            }
        }

        let taints = node
            .spec
            .as_ref()
            .and_then(|s| s.taints.as_deref())
            .unwrap_or_default();
        let tolerations = spec
            .and_then(|s| s.tolerations.as_deref())
            .unwrap_or_default();
        if let Some(taint) = first_untolerated(taints, tolerations) {
            reasons.push(format!("node(s) had untolerated taint {{{}}}", taint.key));
        }

        let internal = |e: crate::resources::ResourceError| PredicateError::Internal(e.to_string());
        let allocatable = node_allocatable(node).map_err(internal)?;

        if let Some(max_pods) = allocatable.get(RESOURCE_PODS) {
            let after = (info.pods.len() as i64 + 1) * 1000;
            if after > *max_pods {
                reasons.push("Too many pods".to_string());
            }
        }

        let mut used = crate::resources::MilliResources::new();
        for existing in &info.pods {
            for (name, amount) in pod_requests(existing).map_err(internal)? {
                *used.entry(name).or_insert(0) += amount;
            }
        }
        for (name, amount) in pod_requests(pod).map_err(internal)? {
            if amount <= 0 {
                continue;
            }
            let free = allocatable.get(&name).copied().unwrap_or(0)
                - used.get(&name).copied().unwrap_or(0);
            if amount > free {
                reasons.push(format!("Insufficient {}", name));
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(PredicateError::NotSchedulable {
                pod: pod_key(pod),
                node: node_name.to_string(),
                reasons,
            })
        }
    }
}
