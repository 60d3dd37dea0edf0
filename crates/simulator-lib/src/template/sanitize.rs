//! Identity scrubbing for template nodes

use crate::models::NodeInfo;
use crate::naming::{template_node_name, NameSource};
use crate::taints::{sanitize_taints, TaintKeySet};
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;

pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

/// Copy of `node` under a fresh synthesized name.
///
/// The hostname label follows the new name; other labels are copied as
/// they are. Taints with ignored keys are dropped.
pub fn sanitize_template_node(
    node: &Node,
    node_group: &str,
    ignored_taints: &TaintKeySet,
    names: &dyn NameSource,
) -> Node {
    let mut sanitized = node.clone();
    let name = template_node_name(node_group, names);

    if let Some(labels) = node.metadata.labels.as_ref() {
        let relabeled: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| {
                if k == LABEL_HOSTNAME {
                    (k.clone(), name.clone())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        sanitized.metadata.labels = Some(relabeled);
    }
    sanitized.metadata.name = Some(name);

    if let Some(spec) = sanitized.spec.as_mut() {
        if let Some(taints) = spec.taints.as_ref() {
            spec.taints = Some(sanitize_taints(taints, ignored_taints));
        }
    }

    sanitized
}

/// Sanitize the node and rebind every pod to its new name
pub fn sanitize_node_info(
    info: &NodeInfo,
    node_group: &str,
    ignored_taints: &TaintKeySet,
    names: &dyn NameSource,
) -> NodeInfo {
    let node = sanitize_template_node(&info.node, node_group, ignored_taints, names);
    let node_name = node.metadata.name.clone();

    let pods = info
        .pods
        .iter()
        .map(|pod| {
            let mut pod = pod.clone();
            pod.spec.get_or_insert_with(Default::default).node_name = node_name.clone();
            pod
        })
        .collect();

    NodeInfo::new(node, pods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pod_node_name;
    use crate::naming::{RandomNameSource, SequentialNameSource};
    use crate::taints::parse_taint_keys;
    use k8s_openapi::api::core::v1::{NodeSpec, Pod, PodSpec, Taint};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn source_node() -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("ip-10-0-0-1".to_string()),
                labels: Some(BTreeMap::from([
                    (LABEL_HOSTNAME.to_string(), "ip-10-0-0-1".to_string()),
                    ("zone".to_string(), "eu-west-1a".to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                taints: Some(vec![
                    Taint {
                        key: "ignore-me".to_string(),
                        effect: "NoSchedule".to_string(),
                        ..Default::default()
                    },
                    Taint {
                        key: "dedicated".to_string(),
                        effect: "NoSchedule".to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn bound_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("ip-10-0-0-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_template_node() {
        let names = SequentialNameSource::starting_at(42);
        let node = sanitize_template_node(&source_node(), "ng-1", &parse_taint_keys("ignore-me"), &names);

        assert_eq!(node.metadata.name.as_deref(), Some("template-node-for-ng-1-42"));
        let labels = node.metadata.labels.unwrap();
        assert_eq!(labels[LABEL_HOSTNAME], "template-node-for-ng-1-42");
        assert_eq!(labels["zone"], "eu-west-1a");
        let taints = node.spec.unwrap().taints.unwrap();
        assert_eq!(taints.len(), 1);
        assert_eq!(taints[0].key, "dedicated");
    }

    #[test]
    fn test_sanitizing_twice_differs_only_in_name() {
        let names = RandomNameSource;
        let ignored = parse_taint_keys("ignore-me");
        let mut a = sanitize_template_node(&source_node(), "ng-1", &ignored, &names);
        let mut b = sanitize_template_node(&source_node(), "ng-1", &ignored, &names);

        assert_ne!(a.metadata.name, b.metadata.name);

        for node in [&mut a, &mut b] {
            node.metadata.name = None;
            node.metadata
                .labels
                .as_mut()
                .unwrap()
                .remove(LABEL_HOSTNAME);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_sanitize_node_info_rebinds_pods() {
        let info = NodeInfo::new(source_node(), vec![bound_pod("a"), Pod::default()]);
        let sanitized = sanitize_node_info(
            &info,
            "ng-1",
            &TaintKeySet::new(),
            &SequentialNameSource::default(),
        );

        assert_eq!(sanitized.pods.len(), 2);
        for pod in &sanitized.pods {
            assert_eq!(pod_node_name(pod), Some(sanitized.node_name()));
        }
        // Source untouched.
        assert_eq!(pod_node_name(&info.pods[0]), Some("ip-10-0-0-1"));
    }
}
