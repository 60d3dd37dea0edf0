//! Integration tests for the simulator API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use simulator_lib::health::{components, HealthRegistry};
use simulator_lib::observability::SimulatorMetrics;
use simulator_lib::ErrorKind;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use template_simulator::{api::create_router, SimulatorConfig, SimulatorService};
use tower::ServiceExt;

const CLUSTER_STATE: &str = r#"{
    "provider": "aws",
    "nodes": [
        {
            "metadata": {"name": "n1", "labels": {"kubernetes.io/hostname": "n1"}},
            "spec": {"providerID": "aws:///eu-west-1a/i-1"},
            "status": {
                "allocatable": {"cpu": "4", "memory": "8Gi", "pods": "110"},
                "conditions": [{"type": "Ready", "status": "True"}]
            }
        },
        {
            "metadata": {"name": "n2"},
            "spec": {"providerID": "aws:///eu-west-1a/i-2"},
            "status": {
                "allocatable": {"cpu": "4", "memory": "8Gi"},
                "conditions": [{"type": "Ready", "status": "True"}]
            }
        }
    ],
    "pods": [
        {
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "ownerReferences": [{"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web", "uid": "1", "controller": true}]
            },
            "spec": {"nodeName": "n1", "containers": [{"name": "web"}]}
        },
        {
            "metadata": {"name": "bare", "namespace": "default"},
            "spec": {"nodeName": "n2", "containers": [{"name": "bare"}]}
        }
    ],
    "daemonsets": [
        {
            "metadata": {"name": "fluentd", "namespace": "kube-system"},
            "spec": {
                "selector": {"matchLabels": {"app": "fluentd"}},
                "template": {
                    "metadata": {"labels": {"app": "fluentd"}},
                    "spec": {"containers": [{"name": "fluentd", "resources": {"requests": {"cpu": "100m"}}}]}
                }
            }
        }
    ],
    "replicas": [{"kind": "ReplicaSet", "namespace": "default", "name": "web", "replicas": 3}],
    "node_groups": [
        {"id": "ng-1", "max_size": 5, "provider_id_prefix": "aws:///eu-west-1a/"},
        {
            "id": "ng-2",
            "max_size": 5,
            "template": {
                "node": {
                    "metadata": {"name": "ng-2-template"},
                    "status": {"capacity": {"cpu": "4", "memory": "8Gi"}}
                }
            }
        }
    ]
}"#;

fn write_state(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn setup_test_app(state_path: &str) -> (Router, Arc<SimulatorService>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER_STATE).await;
    health_registry.register(components::SYNTHESIZER).await;

    let config = SimulatorConfig {
        cluster_state_path: state_path.to_string(),
        ..Default::default()
    };
    let service = Arc::new(SimulatorService::new(
        config,
        health_registry,
        SimulatorMetrics::new(),
    ));
    (create_router(service.clone()), service)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_pass() {
    let file = write_state(CLUSTER_STATE);
    let (app, _service) = setup_test_app(file.path().to_str().unwrap()).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_ready_and_healthy_after_pass() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;

    assert_eq!(service.run_pass().await.unwrap(), 2);

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["last_pass"]["templates"], 2);
    assert!(health["components"].get(components::SYNTHESIZER).is_some());
}

#[tokio::test]
async fn test_templates_endpoint() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;
    service.run_pass().await.unwrap();

    let (status, templates) = get_json(app.clone(), "/templates").await;
    assert_eq!(status, StatusCode::OK);
    let live = &templates["ng-1"];
    let name = live["node"]["metadata"]["name"].as_str().unwrap();
    assert!(name.starts_with("template-node-for-ng-1-"));
    assert_eq!(live["node"]["metadata"]["labels"]["kubernetes.io/hostname"], name);
    assert_eq!(live["pods"][0]["spec"]["nodeName"], name);

    let (status, cloud) = get_json(app.clone(), "/templates/ng-2").await;
    assert_eq!(status, StatusCode::OK);
    let name = cloud["node"]["metadata"]["name"].as_str().unwrap();
    assert!(name.starts_with("template-node-for-ng-2-"));
    let pods = cloud["pods"].as_array().unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0]["metadata"]["namespace"], "kube-system");
    assert_eq!(pods[0]["spec"]["nodeName"], name);

    let (status, missing) = get_json(app, "/templates/ng-3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(missing["error"].as_str().unwrap().contains("ng-3"));
}

#[tokio::test]
async fn test_drain_endpoint() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;

    let (status, _) = get_json(app.clone(), "/drain/n1").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    service.run_pass().await.unwrap();

    let (status, verdict) = get_json(app.clone(), "/drain/n1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["drainable"], true);
    assert_eq!(verdict["pods_to_move"][0], "default/web-1");

    let (status, verdict) = get_json(app, "/drain/n2").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(verdict["drainable"], false);
    assert_eq!(verdict["blocking_pod"], "default/bare");
    assert_eq!(verdict["reason"], "unreplicated_controller");
}

#[tokio::test]
async fn test_drain_unknown_node_returns_404() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;
    service.run_pass().await.unwrap();

    let (status, verdict) = get_json(app, "/drain/ghost-node").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(verdict["drainable"], false);
    assert_eq!(verdict["pods_to_move"].as_array().unwrap().len(), 0);
    assert!(verdict["error"].as_str().unwrap().contains("ghost-node"));
}

#[tokio::test]
async fn test_unreadable_state_marks_unhealthy() {
    let (app, service) = setup_test_app("/nonexistent/cluster-state.json").await;

    let err = service.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);

    let (status, health) = get_json(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["components"][components::CLUSTER_STATE]["status"], "unhealthy");
    assert_eq!(health["last_pass"]["templates"], 0);
    assert!(health["last_pass"]["error"]
        .as_str()
        .unwrap()
        .contains("cluster-state.json"));

    let (status, _) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_failed_reload_replaces_last_pass() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;
    service.run_pass().await.unwrap();

    std::fs::write(file.path(), "{not json").unwrap();
    assert!(service.run_pass().await.is_err());

    let (_, health) = get_json(app, "/healthz").await;
    assert_eq!(health["last_pass"]["templates"], 0);
    assert!(health["last_pass"]["error"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let file = write_state(CLUSTER_STATE);
    let (app, service) = setup_test_app(file.path().to_str().unwrap()).await;
    service.run_pass().await.unwrap();

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let metrics_text = String::from_utf8(body).unwrap();
    assert!(metrics_text.contains("node_template_templates_built_total"));
    assert!(metrics_text.contains("node_template_synthesis_latency_seconds_bucket"));
    assert!(metrics_text.contains("node_template_nodes"));
}
