//! Provider-specific removal of pods duplicated by daemon projection
//!
//! Some providers declare a static mirror pod in their template for a
//! component that the cluster also runs as a DaemonSet. When projection
//! already produced the DaemonSet pod, the declared copy must go.

use crate::models::{pod_name, pod_namespace};
use k8s_openapi::api::core::v1::Pod;

pub trait DuplicatePodSuppressor: Send + Sync + std::fmt::Debug {
    /// True if `template_pod` duplicates one of `daemon_pods`
    fn is_duplicate(&self, daemon_pods: &[Pod], template_pod: &Pod) -> bool;
}

/// Keeps every declared pod
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSuppressor;

impl DuplicatePodSuppressor for NoopSuppressor {
    fn is_duplicate(&self, _daemon_pods: &[Pod], _template_pod: &Pod) -> bool {
        false
    }
}

/// Drops the template's kube-proxy mirror pod once a kube-proxy daemon pod
/// has been projected
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeProxyMirrorSuppressor;

const KUBE_SYSTEM: &str = "kube-system";
const KUBE_PROXY: &str = "kube-proxy";

impl KubeProxyMirrorSuppressor {
    fn is_kube_proxy(pod: &Pod) -> bool {
        pod_namespace(pod) == KUBE_SYSTEM && pod_name(pod).contains(KUBE_PROXY)
    }

    /// The provider template's stand-in pod: kube-proxy by name, no owner
    fn is_mirror_kube_proxy(pod: &Pod) -> bool {
        pod_namespace(pod) == KUBE_SYSTEM
            && pod_name(pod).starts_with(KUBE_PROXY)
            && pod
                .metadata
                .owner_references
                .as_ref()
                .map_or(true, |owners| owners.is_empty())
    }
}

impl DuplicatePodSuppressor for KubeProxyMirrorSuppressor {
    fn is_duplicate(&self, daemon_pods: &[Pod], template_pod: &Pod) -> bool {
        Self::is_mirror_kube_proxy(template_pod) && daemon_pods.iter().any(Self::is_kube_proxy)
    }
}

/// Suppression policy for the named cloud provider
pub fn suppressor_for_provider(provider: &str) -> Box<dyn DuplicatePodSuppressor> {
    match provider {
        "aws" => Box::new(KubeProxyMirrorSuppressor),
        _ => Box::new(NoopSuppressor),
    }
}

/// Daemon pods followed by the declared template pods that survive the
/// suppressor
pub fn effective_node_pods(
    daemon_pods: Vec<Pod>,
    template_pods: &[Pod],
    suppressor: &dyn DuplicatePodSuppressor,
) -> Vec<Pod> {
    let kept: Vec<Pod> = template_pods
        .iter()
        .filter(|pod| !suppressor.is_duplicate(&daemon_pods, pod))
        .cloned()
        .collect();
    let mut result = daemon_pods;
    result.extend(kept);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_aws_drops_mirror_when_daemon_present() {
        let suppressor = suppressor_for_provider("aws");
        let daemon = vec![pod("kube-system", "kube-proxy-pod-1")];
        let declared = vec![pod("kube-system", "kube-proxy-template"), pod("default", "agent")];

        let pods = effective_node_pods(daemon, &declared, suppressor.as_ref());
        let names: Vec<_> = pods.iter().map(pod_name).collect();
        assert_eq!(names, vec!["kube-proxy-pod-1", "agent"]);
    }

    #[test]
    fn test_aws_keeps_mirror_without_daemon() {
        let suppressor = suppressor_for_provider("aws");
        let declared = vec![pod("kube-system", "kube-proxy-template")];

        let pods = effective_node_pods(vec![pod("kube-system", "fluentd-pod-1")], &declared, suppressor.as_ref());
        assert_eq!(pods.len(), 2);
    }

    #[test]
    fn test_owned_kube_proxy_is_not_a_mirror() {
        let mut owned = pod("kube-system", "kube-proxy-abc");
        owned.metadata.owner_references = Some(vec![OwnerReference {
            kind: "DaemonSet".to_string(),
            ..Default::default()
        }]);
        let daemon = vec![pod("kube-system", "kube-proxy-pod-1")];

        assert!(!KubeProxyMirrorSuppressor.is_duplicate(&daemon, &owned));
    }

    #[test]
    fn test_other_providers_keep_everything() {
        let suppressor = suppressor_for_provider("gce");
        let daemon = vec![pod("kube-system", "kube-proxy-pod-1")];
        let declared = vec![pod("kube-system", "kube-proxy-template")];

        assert_eq!(effective_node_pods(daemon, &declared, suppressor.as_ref()).len(), 2);
    }
}
