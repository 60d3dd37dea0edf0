//! Cluster state snapshots loaded from JSON
//!
//! The service and the CLI work from a file holding nodes, pods,
//! DaemonSets, disruption budgets, controller replica counts and the node
//! group declarations of a static cloud provider.

use crate::cloudprovider::{NodeGroupSpec, StaticCloudProvider};
use crate::listers::{pods_by_node, ControllerReplicas, StaticListers};
use crate::models::{node_name, PodsByNode};
use crate::readiness::{is_unschedulable, readiness_state};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PROVIDER: &str = "static";

#[derive(Debug, Error)]
pub enum ClusterStateError {
    #[error("failed to read cluster state from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cluster state: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    /// Cloud provider name, selects provider-specific template handling
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub daemonsets: Vec<DaemonSet>,
    #[serde(default)]
    pub pdbs: Vec<PodDisruptionBudget>,
    #[serde(default)]
    pub replicas: Vec<ControllerReplicas>,
    #[serde(default)]
    pub node_groups: Vec<NodeGroupSpec>,
}

impl ClusterState {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClusterStateError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ClusterStateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ClusterStateError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn cloud_provider(&self) -> StaticCloudProvider {
        StaticCloudProvider::new(self.provider.clone(), self.node_groups.clone())
    }

    pub fn listers(&self) -> StaticListers {
        StaticListers::new(self.pods.clone(), &self.replicas)
    }

    pub fn pods_by_node(&self) -> PodsByNode {
        pods_by_node(&self.pods)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| node_name(n) == name)
    }
}

/// Readiness verdict of one node, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReadiness {
    pub name: String,
    pub ready: bool,
    pub schedulable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeReadiness {
    pub fn usable(&self) -> bool {
        self.ready && self.schedulable
    }
}

pub fn node_readiness(nodes: &[Node]) -> Vec<NodeReadiness> {
    nodes
        .iter()
        .map(|node| {
            let (ready, last_transition, error) = match readiness_state(node) {
                Ok(state) => (state.ready, state.last_transition, None),
                Err(err) => (false, None, Some(err.to_string())),
            };
            NodeReadiness {
                name: node_name(node).to_string(),
                ready,
                schedulable: !is_unschedulable(node),
                last_transition,
                error,
            }
        })
        .collect()
}
