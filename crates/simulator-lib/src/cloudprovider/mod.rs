//! Cloud provider contracts
//!
//! Only node-group discovery and template lookup are needed by the core.
//! A node outside every autoscaled group resolves to `Ok(None)`.

mod static_provider;

pub use static_provider::{NodeGroupSpec, StaticCloudProvider, StaticNodeGroup};

use crate::errors::AutoscalerError;
use crate::models::NodeInfo;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudProviderError {
    /// The provider cannot supply this capability; callers skip quietly
    #[error("not implemented")]
    NotImplemented,
    #[error("{0}")]
    Other(String),
}

/// A horizontally scalable set of nodes
pub trait NodeGroup: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;

    fn min_size(&self) -> i32;

    fn max_size(&self) -> i32;

    /// Node (and the pods the provider expects on it) that a fresh member
    /// of this group would start with
    fn template_node_info(&self) -> Result<NodeInfo, CloudProviderError>;
}

pub trait CloudProvider: Send + Sync {
    /// Provider identity, used to pick provider-specific policies
    fn name(&self) -> &str;

    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>>;

    fn node_group_for_node(&self, node: &Node)
        -> Result<Option<Arc<dyn NodeGroup>>, CloudProviderError>;
}

/// Nodes that do not belong to any autoscaled node group
pub fn filter_out_nodes_from_not_autoscaled_groups(
    nodes: &[Node],
    provider: &dyn CloudProvider,
) -> Result<Vec<Node>, AutoscalerError> {
    let mut result = Vec::new();
    for node in nodes {
        let group = provider
            .node_group_for_node(node)
            .map_err(AutoscalerError::cloud_provider)?;
        if group.is_none() {
            result.push(node.clone());
        }
    }
    Ok(result)
}
