//! Drain eligibility of a single node

use anyhow::{bail, Result};
use serde::Serialize;
use simulator_lib::drain::{DrainError, DrainEvaluator, DrainMode, DrainOptions};
use simulator_lib::models::pod_key;
use simulator_lib::ClusterState;
use tabled::Tabled;

use crate::output::{print_json, print_success, print_table, print_warning, OutputFormat};

/// Exit code when a pod blocks the drain
pub const EXIT_BLOCKED: u8 = 2;

#[derive(Debug, Default)]
pub struct DrainArgs {
    pub detailed: bool,
    pub min_replica_count: i32,
    pub allow_system_pods: bool,
    pub allow_local_storage: bool,
}

impl DrainArgs {
    fn options(&self) -> DrainOptions {
        DrainOptions {
            skip_nodes_with_system_pods: !self.allow_system_pods,
            skip_nodes_with_local_storage: !self.allow_local_storage,
        }
    }
}

/// Row for pods-to-move table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    name: String,
}

#[derive(Debug, Serialize)]
struct DrainVerdict {
    node: String,
    mode: &'static str,
    drainable: bool,
    pods_to_move: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocking_pod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn evaluate(state: &ClusterState, node: &str, args: &DrainArgs) -> Result<DrainVerdict> {
    if state.node(node).is_none() {
        bail!("Node {} not found in cluster state", node);
    }

    let listers = state.listers();
    let mode = if args.detailed {
        DrainMode::Detailed {
            listers: &listers,
            min_replica_count: args.min_replica_count,
        }
    } else {
        DrainMode::Fast
    };
    let evaluator = DrainEvaluator::new(args.options());

    let mut verdict = DrainVerdict {
        node: node.to_string(),
        mode: mode.as_str(),
        drainable: false,
        pods_to_move: Vec::new(),
        blocking_pod: None,
        reason: None,
        message: None,
    };
    match evaluator.node_pods_to_move(node, &listers, mode, &state.pdbs, chrono::Utc::now()) {
        Ok(pods) => {
            verdict.drainable = true;
            verdict.pods_to_move = pods.iter().map(pod_key).collect();
        }
        Err(err @ DrainError::Blocked { .. }) => {
            if let Some(blocking) = err.blocking_pod() {
                verdict.blocking_pod = Some(pod_key(&blocking.pod));
                verdict.reason = Some(blocking.reason.to_string());
            }
            verdict.message = Some(err.to_string());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(verdict)
}

/// Print the drain verdict for `node`; `Ok(false)` when a pod blocks it
pub fn check_drain(
    state: &ClusterState,
    node: &str,
    args: &DrainArgs,
    format: OutputFormat,
) -> Result<bool> {
    let verdict = evaluate(state, node, args)?;

    if format == OutputFormat::Json {
        print_json(&verdict);
        return Ok(verdict.drainable);
    }

    if verdict.drainable {
        print_success(&format!(
            "Node {} can be drained ({} mode), {} pods to move",
            verdict.node,
            verdict.mode,
            verdict.pods_to_move.len()
        ));
        let rows: Vec<PodRow> = verdict
            .pods_to_move
            .iter()
            .map(|key| {
                let (namespace, name) = key.split_once('/').unwrap_or(("", key.as_str()));
                PodRow {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            })
            .collect();
        if !rows.is_empty() {
            print_table(&rows, &verdict, format);
        }
    } else {
        print_warning(&format!(
            "Node {} cannot be drained: {} ({})",
            verdict.node,
            verdict.message.as_deref().unwrap_or_default(),
            verdict.reason.as_deref().unwrap_or("unknown")
        ));
    }
    Ok(verdict.drainable)
}
