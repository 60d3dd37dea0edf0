//! Template synthesis pass
//!
//! Builds one representative node (with its expected pods) per node group.
//! Sources, in priority order: a ready node of the group, the cache of
//! previously seen ready nodes, the cloud provider template, and finally an
//! unready node of the group.

use super::sanitize::sanitize_node_info;
use super::suppressor::{effective_node_pods, DuplicatePodSuppressor, NoopSuppressor};
use crate::cloudprovider::{CloudProvider, CloudProviderError, NodeGroup};
use crate::daemonset::daemonset_pods_for_node;
use crate::errors::AutoscalerError;
use crate::listers::{pods_by_node, ListerRegistry};
use crate::models::{node_name, NodeGroupId, NodeInfo, PodsByNode, TemplateCache};
use crate::naming::{NameSource, RandomNameSource};
use crate::observability::{EventLogger, SimulatorMetrics, TemplateSource};
use crate::readiness::is_node_ready_and_schedulable;
use crate::simulator::PredicateChecker;
use crate::taints::TaintKeySet;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Node;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Builds node templates for every node group of a cloud provider
pub struct TemplateSynthesizer {
    ignored_taints: TaintKeySet,
    force_cloud_template: bool,
    names: Arc<dyn NameSource>,
    suppressor: Arc<dyn DuplicatePodSuppressor>,
    metrics: Option<SimulatorMetrics>,
    logger: EventLogger,
}

impl std::fmt::Debug for TemplateSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSynthesizer")
            .field("ignored_taints", &self.ignored_taints)
            .field("force_cloud_template", &self.force_cloud_template)
            .field("suppressor", &self.suppressor)
            .finish()
    }
}

impl Default for TemplateSynthesizer {
    fn default() -> Self {
        TemplateSynthesizerBuilder::new().build()
    }
}

impl TemplateSynthesizer {
    pub fn builder() -> TemplateSynthesizerBuilder {
        TemplateSynthesizerBuilder::new()
    }

    pub fn ignored_taints(&self) -> &TaintKeySet {
        &self.ignored_taints
    }

    pub fn force_cloud_template(&self) -> bool {
        self.force_cloud_template
    }

    /// Run one synthesis pass.
    ///
    /// Templates built from ready nodes are cached; the cache is pruned of
    /// groups the provider no longer lists. A failing cloud provider
    /// template only drops its own group, while errors resolving the group
    /// of a node abort the whole pass.
    pub fn build_templates_for_groups(
        &self,
        nodes: &[Node],
        cache: &mut TemplateCache,
        provider: &dyn CloudProvider,
        pods: &PodsByNode,
        daemonsets: &[DaemonSet],
        checker: &dyn PredicateChecker,
    ) -> Result<HashMap<NodeGroupId, NodeInfo>, AutoscalerError> {
        let started = Instant::now();
        let mut result: HashMap<NodeGroupId, NodeInfo> = HashMap::new();

        let (ready, unready): (Vec<&Node>, Vec<&Node>) = nodes
            .iter()
            .partition(|node| is_node_ready_and_schedulable(node));
        if let Some(metrics) = &self.metrics {
            metrics.set_node_counts(ready.len() as i64, unready.len() as i64);
        }

        for node in &ready {
            if let Some(id) = self.process_node(node, provider, pods, &mut result)? {
                cache.insert(id.clone(), result[&id].deep_copy());
                self.record_built(&id, TemplateSource::ReadyNode, &result[&id]);
            }
        }

        let mut seen_groups: HashSet<NodeGroupId> = HashSet::new();
        for group in provider.node_groups() {
            let id = group.id().to_string();
            seen_groups.insert(id.clone());
            if result.contains_key(&id) {
                continue;
            }

            if let Some(cached) = cache.get(&id) {
                let info = cached.deep_copy();
                self.record_built(&id, TemplateSource::Cache, &info);
                result.insert(id, info);
                continue;
            }

            match self.template_from_cloud_provider(group.as_ref(), daemonsets, checker) {
                Ok(Some(info)) => {
                    self.record_built(&id, TemplateSource::CloudProvider, &info);
                    result.insert(id, info);
                }
                Ok(None) => {
                    debug!(node_group = %id, "Node group has no cloud provider template");
                }
                Err(err) => {
                    error!(node_group = %id, error = %err, "Unable to build proper template node");
                    self.logger.log_template_skipped(&id, &err.to_string());
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_template_build_failures(&id, err.kind().as_str());
                    }
                }
            }
        }

        cache.retain(|id| {
            let keep = seen_groups.contains(id);
            if !keep {
                self.logger.log_cache_pruned(id);
            }
            keep
        });

        for node in &unready {
            if let Some(id) = self.process_node(node, provider, pods, &mut result)? {
                self.logger.log_template_from_unready_node(&id, node_name(node));
                self.record_built(&id, TemplateSource::UnreadyNode, &result[&id]);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_synthesis_latency(started.elapsed().as_secs_f64());
        }
        Ok(result)
    }

    /// Build a template from a live node if its group has none yet.
    ///
    /// Returns the group id when a template was added.
    fn process_node(
        &self,
        node: &Node,
        provider: &dyn CloudProvider,
        pods: &PodsByNode,
        result: &mut HashMap<NodeGroupId, NodeInfo>,
    ) -> Result<Option<NodeGroupId>, AutoscalerError> {
        if self.force_cloud_template {
            return Ok(None);
        }

        let group = provider
            .node_group_for_node(node)
            .map_err(AutoscalerError::cloud_provider)?;
        let Some(group) = group else {
            return Ok(None);
        };

        let id = group.id().to_string();
        if result.contains_key(&id) {
            return Ok(None);
        }

        let node_pods = pods.get(node_name(node)).cloned().unwrap_or_default();
        let info = NodeInfo::new(node.clone(), node_pods);
        let sanitized = sanitize_node_info(&info, &id, &self.ignored_taints, self.names.as_ref());
        result.insert(id.clone(), sanitized);
        Ok(Some(id))
    }

    /// Template for a group built from its cloud provider description.
    ///
    /// Daemon pods the node would admit are projected onto it; pods the
    /// provider declared are kept unless the suppressor marks them as
    /// duplicates. `Ok(None)` means the provider offers no template.
    pub fn template_from_cloud_provider(
        &self,
        group: &dyn NodeGroup,
        daemonsets: &[DaemonSet],
        checker: &dyn PredicateChecker,
    ) -> Result<Option<NodeInfo>, AutoscalerError> {
        let base = match group.template_node_info() {
            Ok(base) => base,
            Err(CloudProviderError::NotImplemented) => return Ok(None),
            Err(err) => return Err(AutoscalerError::cloud_provider(err)),
        };

        let daemon_pods =
            daemonset_pods_for_node(&base, daemonsets, checker, self.names.as_ref())
                .map_err(AutoscalerError::internal)?;
        if let Some(metrics) = &self.metrics {
            let admitted = daemon_pods.len() as u64;
            metrics.add_daemonset_pods(admitted, daemonsets.len() as u64 - admitted);
        }

        let pods = effective_node_pods(daemon_pods, &base.pods, self.suppressor.as_ref());
        let full = NodeInfo::new(base.node, pods);
        Ok(Some(sanitize_node_info(
            &full,
            group.id(),
            &self.ignored_taints,
            self.names.as_ref(),
        )))
    }

    fn record_built(&self, node_group: &str, source: TemplateSource, info: &NodeInfo) {
        self.logger
            .log_template_built(node_group, source, info.node_name(), info.pods.len());
        if let Some(metrics) = &self.metrics {
            metrics.inc_templates_built(source);
        }
    }
}

/// Builder for [`TemplateSynthesizer`]
pub struct TemplateSynthesizerBuilder {
    ignored_taints: TaintKeySet,
    force_cloud_template: bool,
    names: Arc<dyn NameSource>,
    suppressor: Arc<dyn DuplicatePodSuppressor>,
    metrics: Option<SimulatorMetrics>,
    logger: EventLogger,
}

impl TemplateSynthesizerBuilder {
    /// Random names, no ignored taints, no-op suppressor, no metrics
    pub fn new() -> Self {
        Self {
            ignored_taints: TaintKeySet::new(),
            force_cloud_template: false,
            names: Arc::new(RandomNameSource),
            suppressor: Arc::new(NoopSuppressor),
            metrics: None,
            logger: EventLogger::default(),
        }
    }

    /// Taint keys stripped from every template node
    pub fn ignored_taints(mut self, taints: TaintKeySet) -> Self {
        self.ignored_taints = taints;
        self
    }

    /// Always build templates from the cloud provider
    pub fn force_cloud_template(mut self, force: bool) -> Self {
        self.force_cloud_template = force;
        self
    }

    pub fn name_source(mut self, names: Arc<dyn NameSource>) -> Self {
        self.names = names;
        self
    }

    pub fn suppressor(mut self, suppressor: Arc<dyn DuplicatePodSuppressor>) -> Self {
        self.suppressor = suppressor;
        self
    }

    pub fn metrics(mut self, metrics: SimulatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: EventLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> TemplateSynthesizer {
        TemplateSynthesizer {
            ignored_taints: self.ignored_taints,
            force_cloud_template: self.force_cloud_template,
            names: self.names,
            suppressor: self.suppressor,
            metrics: self.metrics,
            logger: self.logger,
        }
    }
}

impl Default for TemplateSynthesizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduled pods grouped by the node they are bound to
pub fn pods_for_nodes(listers: &dyn ListerRegistry) -> Result<PodsByNode, AutoscalerError> {
    let pods = listers.scheduled_pods().map_err(AutoscalerError::api_call)?;
    Ok(pods_by_node(&pods))
}
