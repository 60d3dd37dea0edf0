//! Template Simulator - node template synthesis service
//!
//! Runs synthesis passes over a cluster state file and exposes the
//! resulting templates next to health and metrics endpoints.

use anyhow::Result;
use simulator_lib::{
    health::{components, HealthRegistry},
    observability::{EventLogger, SimulatorMetrics},
};
use std::sync::Arc;
use template_simulator::{api, SimulatorConfig, SimulatorService};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SIMULATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting template-simulator");

    let config = SimulatorConfig::load()?;
    info!(
        cluster_state_path = %config.cluster_state_path,
        interval_secs = config.evaluation_interval_secs,
        force_cloud_template = config.force_cloud_template,
        "Simulator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER_STATE).await;
    health_registry.register(components::SYNTHESIZER).await;

    let metrics = SimulatorMetrics::new();
    let logger = EventLogger::new(config.cluster_name.clone());

    let port = config.api_port;
    let service = Arc::new(SimulatorService::new(config, health_registry, metrics));

    // First pass up front so readiness reflects real state quickly.
    let templates = service.run_pass().await.unwrap_or_default();
    logger.log_startup(SIMULATOR_VERSION, templates);

    let loop_handle = tokio::spawn(service.clone().run());
    let api_handle = tokio::spawn(api::serve(port, service));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(err)) => format!("API server failed: {}", err),
                Err(err) => format!("API server task panicked: {}", err),
            };
            logger.log_shutdown(&reason);
        }
    }

    loop_handle.abort();
    info!("Shutting down");

    Ok(())
}
