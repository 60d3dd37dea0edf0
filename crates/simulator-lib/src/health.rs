//! Health tracking for the template simulator service
//!
//! Liveness reflects the state of each component; readiness additionally
//! requires one successful synthesis pass.

use crate::errors::AutoscalerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but the last pass dropped some node groups
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Outcome of the most recent synthesis pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub timestamp: i64,
    pub node_groups: usize,
    pub templates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassSummary>,
}

impl HealthResponse {
    /// Worst status among the components; healthy when there are none
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut status = ComponentStatus::Healthy;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }
        status
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const CLUSTER_STATE: &str = "cluster_state";
    pub const SYNTHESIZER: &str = "synthesizer";
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    last_pass: Arc<RwLock<Option<PassSummary>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record a synthesis pass over `node_groups` groups.
    ///
    /// A pass that built fewer templates than there are groups marks the
    /// synthesizer degraded; a failed pass marks it unhealthy.
    pub async fn record_pass(&self, node_groups: usize, outcome: &Result<usize, AutoscalerError>) {
        let (health, templates, error) = match outcome {
            Ok(templates) if *templates < node_groups => (
                ComponentHealth::degraded(format!(
                    "built {} templates for {} node groups",
                    templates, node_groups
                )),
                *templates,
                None,
            ),
            Ok(templates) => (ComponentHealth::healthy(), *templates, None),
            Err(err) => (
                ComponentHealth::unhealthy(err.to_string()),
                0,
                Some(err.to_string()),
            ),
        };
        let summary = PassSummary {
            timestamp: health.last_check_timestamp,
            node_groups,
            templates,
            error,
        };
        self.update(components::SYNTHESIZER, health).await;
        *self.last_pass.write().await = Some(summary);
    }

    pub async fn last_pass(&self) -> Option<PassSummary> {
        self.last_pass.read().await.clone()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse {
            status,
            components,
            last_pass: self.last_pass().await,
        }
    }

    /// Ready once a pass has succeeded and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;
        let passed = health
            .last_pass
            .as_ref()
            .is_some_and(|pass| pass.error.is_none());

        let reason = if health.last_pass.is_none() {
            Some("No synthesis pass completed yet".to_string())
        } else if !passed {
            Some("Last synthesis pass failed".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
