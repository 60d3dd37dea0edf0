//! Core data models shared by the synthesizer, projector and drain evaluator

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a scalable node group, stable across cycles
pub type NodeGroupId = String;

/// Pods grouped by the name of the node they are bound to
pub type PodsByNode = HashMap<String, Vec<Pod>>;

/// A node together with the pods running (or expected to run) on it.
///
/// Templates produced by the synthesizer are `NodeInfo` values whose node
/// identity has been scrubbed and whose pods are bound to that identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: Node,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl NodeInfo {
    pub fn new(node: Node, pods: Vec<Pod>) -> Self {
        Self { node, pods }
    }

    pub fn node_name(&self) -> &str {
        node_name(&self.node)
    }

    /// Independent copy; nothing in the result aliases `self`
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }
}

/// Templates from previous cycles, keyed by node group.
///
/// Owned by the caller across synthesis passes. A pass inserts a copy of
/// every template built from a live ready node and drops every entry whose
/// group was not enumerated by the cloud provider during that pass.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    entries: HashMap<NodeGroupId, NodeInfo>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&NodeInfo> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: impl Into<NodeGroupId>, info: NodeInfo) {
        self.entries.insert(id.into(), info);
    }

    pub fn remove(&mut self, id: &str) -> Option<NodeInfo> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|id, _| keep(id));
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeGroupId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Name of a node, empty when unset
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

/// Name of a pod, empty when unset
pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

/// Namespace of a pod, empty when unset
pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or_default()
}

/// Node the pod is bound to, if any
pub fn pod_node_name(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref().and_then(|s| s.node_name.as_deref())
}

/// `namespace/name` key used in log lines and error messages
pub fn pod_key(pod: &Pod) -> String {
    format!("{}/{}", pod_namespace(pod), pod_name(pod))
}
