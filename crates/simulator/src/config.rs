//! Simulator configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use simulator_lib::drain::DrainOptions;
use simulator_lib::taints::{parse_taint_keys, TaintKeySet};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SIMULATOR";

/// Simulator configuration, read from `SIMULATOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Cluster name attached to structured events
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// JSON file with nodes, pods, DaemonSets, budgets and node groups
    #[serde(default = "default_cluster_state_path")]
    pub cluster_state_path: String,

    /// API server port for health/metrics/templates
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between synthesis passes
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    /// Comma separated taint keys stripped from templates
    #[serde(default)]
    pub ignored_taints: String,

    #[serde(default)]
    pub force_cloud_template: bool,

    #[serde(default = "default_true")]
    pub skip_nodes_with_system_pods: bool,

    #[serde(default = "default_true")]
    pub skip_nodes_with_local_storage: bool,

    /// Minimum desired replicas of a pod's controller in detailed drains
    #[serde(default)]
    pub min_replica_count: i32,
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_cluster_state_path() -> String {
    "/etc/template-simulator/cluster-state.json".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_evaluation_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            cluster_state_path: default_cluster_state_path(),
            api_port: default_api_port(),
            evaluation_interval_secs: default_evaluation_interval(),
            ignored_taints: String::new(),
            force_cloud_template: false,
            skip_nodes_with_system_pods: true,
            skip_nodes_with_local_storage: true,
            min_replica_count: 0,
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix(ENV_PREFIX))
    }

    pub fn from_env(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read simulator configuration")?;

        config
            .try_deserialize()
            .context("Invalid simulator configuration")
    }

    pub fn ignored_taint_keys(&self) -> TaintKeySet {
        parse_taint_keys(&self.ignored_taints)
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs.max(1))
    }

    pub fn drain_options(&self) -> DrainOptions {
        DrainOptions {
            skip_nodes_with_system_pods: self.skip_nodes_with_system_pods,
            skip_nodes_with_local_storage: self.skip_nodes_with_local_storage,
        }
    }
}
