//! Periodic template synthesis over the configured cluster state

use crate::config::SimulatorConfig;
use k8s_openapi::api::core::v1::Pod;
use simulator_lib::clusterstate::ClusterState;
use simulator_lib::drain::{DrainError, DrainEvaluator, DrainMode};
use simulator_lib::health::{components, HealthRegistry};
use simulator_lib::models::{NodeGroupId, NodeInfo, TemplateCache};
use simulator_lib::observability::{EventLogger, SimulatorMetrics};
use simulator_lib::simulator::BasicPredicateChecker;
use simulator_lib::template::{suppressor_for_provider, TemplateSynthesizer};
use simulator_lib::AutoscalerError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

pub type Templates = HashMap<NodeGroupId, NodeInfo>;

/// Result of a drain request against the last loaded cluster state
#[derive(Debug)]
pub enum DrainOutcome {
    /// No synthesis pass has loaded a cluster state yet
    NotLoaded,
    UnknownNode,
    Evaluated(Result<Vec<Pod>, DrainError>),
}

/// Owns the template cache and the latest synthesis result
pub struct SimulatorService {
    config: SimulatorConfig,
    health: HealthRegistry,
    metrics: SimulatorMetrics,
    logger: EventLogger,
    /// Serializes synthesis passes
    cache: Mutex<TemplateCache>,
    templates: RwLock<Templates>,
    state: RwLock<Option<Arc<ClusterState>>>,
}

impl SimulatorService {
    pub fn new(config: SimulatorConfig, health: HealthRegistry, metrics: SimulatorMetrics) -> Self {
        let logger = EventLogger::new(config.cluster_name.clone());
        Self {
            config,
            health,
            metrics,
            logger,
            cache: Mutex::new(TemplateCache::new()),
            templates: RwLock::new(Templates::new()),
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &SimulatorMetrics {
        &self.metrics
    }

    pub async fn templates(&self) -> Templates {
        self.templates.read().await.clone()
    }

    pub async fn template(&self, node_group: &str) -> Option<NodeInfo> {
        self.templates.read().await.get(node_group).cloned()
    }

    /// Reload the cluster state and rebuild every template.
    ///
    /// Returns the number of templates built.
    pub async fn run_pass(&self) -> Result<usize, AutoscalerError> {
        let state = match ClusterState::load(&self.config.cluster_state_path) {
            Ok(state) => {
                self.health.set_healthy(components::CLUSTER_STATE).await;
                Arc::new(state)
            }
            Err(err) => {
                error!(path = %self.config.cluster_state_path, error = %err, "Failed to load cluster state");
                self.health
                    .set_unhealthy(components::CLUSTER_STATE, err.to_string())
                    .await;
                let failed = Err(AutoscalerError::internal(err));
                self.health.record_pass(0, &failed).await;
                return failed;
            }
        };

        let provider = state.cloud_provider();
        let synthesizer = TemplateSynthesizer::builder()
            .ignored_taints(self.config.ignored_taint_keys())
            .force_cloud_template(self.config.force_cloud_template)
            .suppressor(Arc::from(suppressor_for_provider(&state.provider)))
            .metrics(self.metrics.clone())
            .logger(self.logger.clone())
            .build();

        let node_groups = state.node_groups.len();
        let outcome = {
            let mut cache = self.cache.lock().await;
            synthesizer.build_templates_for_groups(
                &state.nodes,
                &mut cache,
                &provider,
                &state.pods_by_node(),
                &state.daemonsets,
                &BasicPredicateChecker,
            )
        };

        let counted = outcome.as_ref().map(|t| t.len()).map_err(Clone::clone);
        self.health.record_pass(node_groups, &counted).await;
        *self.state.write().await = Some(state);

        match outcome {
            Ok(templates) => {
                info!(node_groups, templates = templates.len(), "Synthesis pass complete");
                *self.templates.write().await = templates;
                counted
            }
            Err(err) => {
                error!(kind = %err.kind(), error = %err, "Synthesis pass failed");
                Err(err)
            }
        }
    }

    /// Drain verdict for a node of the last loaded cluster state
    pub async fn drain(&self, node: &str) -> DrainOutcome {
        let Some(state) = self.state.read().await.clone() else {
            return DrainOutcome::NotLoaded;
        };
        if state.node(node).is_none() {
            return DrainOutcome::UnknownNode;
        }
        let listers = state.listers();
        let evaluator = DrainEvaluator::new(self.config.drain_options())
            .with_metrics(self.metrics.clone())
            .with_logger(self.logger.clone());
        DrainOutcome::Evaluated(evaluator.node_pods_to_move(
            node,
            &listers,
            DrainMode::Detailed {
                listers: &listers,
                min_replica_count: self.config.min_replica_count,
            },
            &state.pdbs,
            chrono::Utc::now(),
        ))
    }

    /// Run passes forever, the first one interval from now
    pub async fn run(self: Arc<Self>) {
        let period = self.config.evaluation_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            debug!("Starting synthesis pass");
            // Failures are recorded in the health registry.
            let _ = self.run_pass().await;
        }
    }
}
