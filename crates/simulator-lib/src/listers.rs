//! Pod and controller listing contracts
//!
//! Detailed drain checks and the pods-by-node grouping need a view of the
//! cluster that the core cannot fetch itself. `StaticListers` serves that
//! view from objects loaded up front.

use crate::models::{pod_node_name, PodsByNode};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listing {resource} failed: {message}")]
pub struct ListerError {
    pub resource: String,
    pub message: String,
}

impl ListerError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Read access to cluster objects
pub trait ListerRegistry: Send + Sync {
    /// All pods bound to a node
    fn scheduled_pods(&self) -> Result<Vec<Pod>, ListerError>;

    /// Desired replicas of the controller named by `owner` in `namespace`.
    /// `Ok(None)` means the controller no longer exists.
    fn controller_replicas(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Option<i32>, ListerError>;
}

/// Desired replica count of one controller object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerReplicas {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub replicas: i32,
}

/// Listers backed by preloaded objects
#[derive(Debug, Clone, Default)]
pub struct StaticListers {
    pods: Vec<Pod>,
    controllers: HashMap<(String, String, String), i32>,
}

impl StaticListers {
    pub fn new(pods: Vec<Pod>, controllers: &[ControllerReplicas]) -> Self {
        let controllers = controllers
            .iter()
            .map(|c| {
                (
                    (c.kind.clone(), c.namespace.clone(), c.name.clone()),
                    c.replicas,
                )
            })
            .collect();
        Self { pods, controllers }
    }
}

impl ListerRegistry for StaticListers {
    fn scheduled_pods(&self) -> Result<Vec<Pod>, ListerError> {
        Ok(self
            .pods
            .iter()
            .filter(|p| pod_node_name(p).is_some_and(|n| !n.is_empty()))
            .cloned()
            .collect())
    }

    fn controller_replicas(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Option<i32>, ListerError> {
        let key = (owner.kind.clone(), namespace.to_string(), owner.name.clone());
        Ok(self.controllers.get(&key).copied())
    }
}

/// Group pods by the node they are bound to; unbound pods are dropped
pub fn pods_by_node(pods: &[Pod]) -> PodsByNode {
    let mut grouped = PodsByNode::new();
    for pod in pods {
        if let Some(node) = pod_node_name(pod).filter(|n| !n.is_empty()) {
            grouped.entry(node.to_string()).or_default().push(pod.clone());
        }
    }
    grouped
}
