//! Batch job and disruption budget checks wrapped around the drain filter

use super::{BlockingPod, BlockingPodReason, DrainError};
use crate::labels::Selector;
use crate::models::{pod_name, pod_namespace};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use std::collections::BTreeMap;

const BATCH_API_GROUP_PREFIX: &str = "batch/";
const JOB_KIND: &str = "Job";

/// Fail on the first pod owned by a batch Job
pub fn check_job_pods(pods: &[Pod]) -> Result<(), DrainError> {
    for pod in pods {
        let owners = pod.metadata.owner_references.as_deref().unwrap_or_default();
        let is_job = owners
            .iter()
            .any(|o| o.api_version.starts_with(BATCH_API_GROUP_PREFIX) && o.kind == JOB_KIND);
        if is_job {
            return Err(DrainError::blocked(
                BlockingPod::new(pod.clone(), BlockingPodReason::UnreplicatedController),
                format!("job pod {}/{} is unmovable", pod_namespace(pod), pod_name(pod)),
            ));
        }
    }
    Ok(())
}

/// Fail on the first pod covered by a budget with no disruptions left.
///
/// Budgets are visited in order, and pods in order within each budget.
pub fn check_pdbs(pods: &[Pod], pdbs: &[PodDisruptionBudget]) -> Result<(), DrainError> {
    for pdb in pdbs {
        let selector = budget_selector(pdb)?;
        let namespace = pdb.metadata.namespace.as_deref().unwrap_or_default();
        for pod in pods {
            if pod_namespace(pod) != namespace || !selector.matches(pod_labels(pod)) {
                continue;
            }
            if disruptions_allowed(pdb) < 1 {
                return Err(DrainError::blocked(
                    BlockingPod::new(pod.clone(), BlockingPodReason::InsufficientDisruptionBudget),
                    format!(
                        "not enough pod disruption budget to move {}/{}",
                        pod_namespace(pod),
                        pod_name(pod)
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// True if some budget in the pod's namespace selects it
pub(crate) fn has_matching_pdb(pod: &Pod, pdbs: &[PodDisruptionBudget]) -> Result<bool, DrainError> {
    for pdb in pdbs {
        if pdb.metadata.namespace.as_deref().unwrap_or_default() != pod_namespace(pod) {
            continue;
        }
        if budget_selector(pdb)?.matches(pod_labels(pod)) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn budget_selector(pdb: &PodDisruptionBudget) -> Result<Selector, DrainError> {
    let selector = pdb.spec.as_ref().and_then(|s| s.selector.as_ref());
    Ok(Selector::from_label_selector(selector)?)
}

fn disruptions_allowed(pdb: &PodDisruptionBudget) -> i32 {
    pdb.status.as_ref().map_or(0, |s| s.disruptions_allowed)
}

fn pod_labels(pod: &Pod) -> &BTreeMap<String, String> {
    static EMPTY: BTreeMap<String, String> = BTreeMap::new();
    pod.metadata.labels.as_ref().unwrap_or(&EMPTY)
}
