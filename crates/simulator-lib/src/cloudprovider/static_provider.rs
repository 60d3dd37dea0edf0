//! Provider whose node groups are declared up front
//!
//! Nodes are matched to groups by explicit name or by provider ID prefix.
//! Groups without a declared template report `NotImplemented`.

use super::{CloudProvider, CloudProviderError, NodeGroup};
use crate::models::{node_name, NodeInfo};
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Declaration of one node group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeGroupSpec {
    pub id: String,
    #[serde(default)]
    pub min_size: i32,
    #[serde(default)]
    pub max_size: i32,
    /// Nodes whose `spec.providerID` starts with this prefix belong here
    #[serde(default)]
    pub provider_id_prefix: Option<String>,
    /// Nodes listed by name belong here
    #[serde(default)]
    pub node_names: Vec<String>,
    #[serde(default)]
    pub template: Option<NodeInfo>,
}

#[derive(Debug, Clone)]
pub struct StaticNodeGroup {
    spec: NodeGroupSpec,
}

impl StaticNodeGroup {
    pub fn new(spec: NodeGroupSpec) -> Self {
        Self { spec }
    }

    fn owns(&self, node: &Node) -> bool {
        let name = node_name(node);
        if self.spec.node_names.iter().any(|n| n == name) {
            return true;
        }
        let provider_id = node.spec.as_ref().and_then(|s| s.provider_id.as_deref());
        match (&self.spec.provider_id_prefix, provider_id) {
            (Some(prefix), Some(id)) => !prefix.is_empty() && id.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}

impl NodeGroup for StaticNodeGroup {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn min_size(&self) -> i32 {
        self.spec.min_size
    }

    fn max_size(&self) -> i32 {
        self.spec.max_size
    }

    fn template_node_info(&self) -> Result<NodeInfo, CloudProviderError> {
        self.spec
            .template
            .clone()
            .ok_or(CloudProviderError::NotImplemented)
    }
}

#[derive(Debug, Clone)]
pub struct StaticCloudProvider {
    name: String,
    groups: Vec<Arc<StaticNodeGroup>>,
}

impl StaticCloudProvider {
    pub fn new(name: impl Into<String>, specs: Vec<NodeGroupSpec>) -> Self {
        let groups = specs
            .into_iter()
            .map(|spec| Arc::new(StaticNodeGroup::new(spec)))
            .collect();
        Self {
            name: name.into(),
            groups,
        }
    }
}

impl CloudProvider for StaticCloudProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>> {
        self.groups
            .iter()
            .map(|g| {
                debug!(node_group = %g.id(), "Discovered node group");
                g.clone() as Arc<dyn NodeGroup>
            })
            .collect()
    }

    fn node_group_for_node(
        &self,
        node: &Node,
    ) -> Result<Option<Arc<dyn NodeGroup>>, CloudProviderError> {
        Ok(self
            .groups
            .iter()
            .find(|g| g.owns(node))
            .map(|g| g.clone() as Arc<dyn NodeGroup>))
    }
}
