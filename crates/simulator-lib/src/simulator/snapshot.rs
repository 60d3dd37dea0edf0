//! In-memory cluster snapshot used to stage candidate nodes

use crate::models::{node_name, NodeInfo};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("node {0} already exists in snapshot")]
    NodeAlreadyExists(String),
}

/// Staging area for nodes and the pods bound to them
pub trait ClusterSnapshot {
    /// Add a node together with the pods already running on it
    fn add_node_with_pods(&mut self, node: Node, pods: Vec<Pod>) -> Result<(), SnapshotError>;

    /// Look up a staged node by name
    fn node_info(&self, node_name: &str) -> Option<&NodeInfo>;
}

/// Map-backed snapshot with no scheduler caches
#[derive(Debug, Clone, Default)]
pub struct BasicClusterSnapshot {
    nodes: HashMap<String, NodeInfo>,
}

impl BasicClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ClusterSnapshot for BasicClusterSnapshot {
    fn add_node_with_pods(&mut self, node: Node, pods: Vec<Pod>) -> Result<(), SnapshotError> {
        // Unnamed nodes are staged under the empty name.
        let name = node_name(&node).to_string();
        if self.nodes.contains_key(&name) {
            return Err(SnapshotError::NodeAlreadyExists(name));
        }
        self.nodes.insert(name, NodeInfo::new(node, pods));
        Ok(())
    }

    fn node_info(&self, node_name: &str) -> Option<&NodeInfo> {
        self.nodes.get(node_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_add_node_with_pods() {
        let mut snapshot = BasicClusterSnapshot::new();
        snapshot
            .add_node_with_pods(node("n1"), vec![Pod::default()])
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.node_info("n1").unwrap().pods.len(), 1);
        assert!(snapshot.node_info("n2").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut snapshot = BasicClusterSnapshot::new();
        snapshot.add_node_with_pods(node("n1"), vec![]).unwrap();

        assert_eq!(
            snapshot.add_node_with_pods(node("n1"), vec![]),
            Err(SnapshotError::NodeAlreadyExists("n1".to_string()))
        );
    }

    #[test]
    fn test_unnamed_node_is_staged_under_empty_name() {
        let mut snapshot = BasicClusterSnapshot::new();
        snapshot
            .add_node_with_pods(Node::default(), vec![Pod::default()])
            .unwrap();

        assert_eq!(snapshot.node_info("").unwrap().pods.len(), 1);
    }
}
