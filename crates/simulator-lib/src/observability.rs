//! Observability infrastructure for the simulator
//!
//! Provides:
//! - Prometheus metrics (templates built, group failures, node readiness,
//!   drain verdicts, synthesis latency)
//! - Structured event logging with tracing
//!
//! Nothing here feeds back into control decisions.

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge_vec, Histogram,
    IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for synthesis pass latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SimulatorMetricsInner> = OnceLock::new();

struct SimulatorMetricsInner {
    synthesis_latency_seconds: Histogram,
    templates_built: IntCounterVec,
    template_build_failures: IntCounterVec,
    nodes_by_readiness: IntGaugeVec,
    daemonset_pods_projected: IntCounterVec,
    drain_evaluations: IntCounterVec,
    drain_blocked: IntCounterVec,
}

impl SimulatorMetricsInner {
    fn new() -> Self {
        Self {
            synthesis_latency_seconds: register_histogram!(
                "node_template_synthesis_latency_seconds",
                "Time spent building node templates for all node groups",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register synthesis_latency_seconds"),

            templates_built: register_int_counter_vec!(
                "node_template_templates_built_total",
                "Node templates built, by source",
                &["source"]
            )
            .expect("Failed to register templates_built"),

            template_build_failures: register_int_counter_vec!(
                "node_template_build_failures_total",
                "Node groups whose template could not be built",
                &["node_group", "kind"]
            )
            .expect("Failed to register template_build_failures"),

            nodes_by_readiness: register_int_gauge_vec!(
                "node_template_nodes",
                "Observed nodes by readiness state",
                &["state"]
            )
            .expect("Failed to register nodes_by_readiness"),

            daemonset_pods_projected: register_int_counter_vec!(
                "node_template_daemonset_pods_projected_total",
                "Daemon pods projected onto template nodes, by outcome",
                &["outcome"]
            )
            .expect("Failed to register daemonset_pods_projected"),

            drain_evaluations: register_int_counter_vec!(
                "node_template_drain_evaluations_total",
                "Drain evaluations, by mode and result",
                &["mode", "result"]
            )
            .expect("Failed to register drain_evaluations"),

            drain_blocked: register_int_counter_vec!(
                "node_template_drain_blocked_total",
                "Drain evaluations blocked, by reason",
                &["reason"]
            )
            .expect("Failed to register drain_blocked"),
        }
    }
}

/// Where a template came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    ReadyNode,
    Cache,
    CloudProvider,
    UnreadyNode,
}

impl TemplateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateSource::ReadyNode => "ready_node",
            TemplateSource::Cache => "cache",
            TemplateSource::CloudProvider => "cloud_provider",
            TemplateSource::UnreadyNode => "unready_node",
        }
    }
}

/// Simulator metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SimulatorMetrics {
    _private: (),
}

impl Default for SimulatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorMetrics").finish()
    }
}

impl SimulatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SimulatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SimulatorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_synthesis_latency(&self, duration_secs: f64) {
        self.inner().synthesis_latency_seconds.observe(duration_secs);
    }

    pub fn inc_templates_built(&self, source: TemplateSource) {
        self.inner()
            .templates_built
            .with_label_values(&[source.as_str()])
            .inc();
    }

    pub fn inc_template_build_failures(&self, node_group: &str, kind: &str) {
        self.inner()
            .template_build_failures
            .with_label_values(&[node_group, kind])
            .inc();
    }

    pub fn set_node_counts(&self, ready: i64, unready: i64) {
        let gauge = &self.inner().nodes_by_readiness;
        gauge.with_label_values(&["ready"]).set(ready);
        gauge.with_label_values(&["unready"]).set(unready);
    }

    pub fn add_daemonset_pods(&self, admitted: u64, skipped: u64) {
        let counter = &self.inner().daemonset_pods_projected;
        counter.with_label_values(&["admitted"]).inc_by(admitted);
        counter.with_label_values(&["skipped"]).inc_by(skipped);
    }

    pub fn inc_drain_evaluations(&self, mode: &str, result: &str) {
        self.inner()
            .drain_evaluations
            .with_label_values(&[mode, result])
            .inc();
    }

    pub fn inc_drain_blocked(&self, reason: &str) {
        self.inner()
            .drain_blocked
            .with_label_values(&[reason])
            .inc();
    }
}

/// Structured logger for simulator events
#[derive(Debug, Clone)]
pub struct EventLogger {
    cluster: String,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new("default")
    }
}

impl EventLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_template_built(&self, node_group: &str, source: TemplateSource, node_name: &str, pods: usize) {
        debug!(
            event = "template_built",
            cluster = %self.cluster,
            node_group = %node_group,
            source = source.as_str(),
            template_node = %node_name,
            pods = pods,
            "Built node template"
        );
    }

    pub fn log_template_from_unready_node(&self, node_group: &str, node_name: &str) {
        warn!(
            event = "template_from_unready_node",
            cluster = %self.cluster,
            node_group = %node_group,
            node = %node_name,
            "Built template based on unready/unschedulable node"
        );
    }

    pub fn log_template_skipped(&self, node_group: &str, error: &str) {
        warn!(
            event = "template_skipped",
            cluster = %self.cluster,
            node_group = %node_group,
            error = %error,
            "Unable to build proper template node"
        );
    }

    pub fn log_cache_pruned(&self, node_group: &str) {
        info!(
            event = "template_cache_pruned",
            cluster = %self.cluster,
            node_group = %node_group,
            "Removed cached template for vanished node group"
        );
    }

    pub fn log_drain_blocked(&self, node: &str, pod: &str, reason: &str, detail: &str) {
        info!(
            event = "drain_blocked",
            cluster = %self.cluster,
            node = %node,
            pod = %pod,
            reason = %reason,
            detail = %detail,
            "Node cannot be drained"
        );
    }

    pub fn log_startup(&self, version: &str, templates: usize) {
        info!(
            event = "simulator_started",
            cluster = %self.cluster,
            version = %version,
            templates = templates,
            "Node template simulator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "simulator_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Node template simulator shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_metrics_creation() {
        // The Prometheus registry is global, so repeated handles must share it.
        let metrics = SimulatorMetrics::new();
        let again = SimulatorMetrics::new();

        metrics.observe_synthesis_latency(0.002);
        metrics.inc_templates_built(TemplateSource::Cache);
        again.inc_template_build_failures("ng-1", "cloud_provider_error");
        metrics.set_node_counts(3, 1);
        metrics.add_daemonset_pods(2, 1);
        metrics.inc_drain_evaluations("fast", "blocked");
        metrics.inc_drain_blocked("insufficient_disruption_budget");
    }

    #[test]
    fn test_template_source_labels() {
        assert_eq!(TemplateSource::ReadyNode.as_str(), "ready_node");
        assert_eq!(TemplateSource::UnreadyNode.as_str(), "unready_node");
    }

    #[test]
    fn test_event_logger_creation() {
        let logger = EventLogger::new("prod-eu");
        assert_eq!(logger.cluster, "prod-eu");
    }
}
