//! Node readiness report

use anyhow::Result;
use serde::Serialize;
use simulator_lib::cloudprovider::filter_out_nodes_from_not_autoscaled_groups;
use simulator_lib::clusterstate::{node_readiness, NodeReadiness};
use simulator_lib::models::node_name;
use simulator_lib::ClusterState;
use tabled::Tabled;

use crate::output::{color_status, format_bool, print_info, print_table, OutputFormat};

/// Row for readiness table
#[derive(Tabled)]
struct ReadinessRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Schedulable")]
    schedulable: String,
    #[tabled(rename = "Autoscaled")]
    autoscaled: String,
    #[tabled(rename = "Since")]
    since: String,
}

#[derive(Debug, Serialize)]
struct ReadinessReport {
    nodes: Vec<NodeReadiness>,
    usable: usize,
    unmanaged: Vec<String>,
}

fn status_of(node: &NodeReadiness) -> &'static str {
    if node.error.is_some() {
        "Error"
    } else if !node.ready {
        "NotReady"
    } else if !node.schedulable {
        "Unschedulable"
    } else {
        "Ready"
    }
}

fn build_report(state: &ClusterState) -> Result<ReadinessReport> {
    let provider = state.cloud_provider();
    let unmanaged: Vec<String> = filter_out_nodes_from_not_autoscaled_groups(&state.nodes, &provider)?
        .iter()
        .map(|n| node_name(n).to_string())
        .collect();
    let nodes = node_readiness(&state.nodes);
    let usable = nodes.iter().filter(|n| n.usable()).count();
    Ok(ReadinessReport {
        nodes,
        usable,
        unmanaged,
    })
}

/// Print the readiness of every node in the cluster state
pub fn show_readiness(state: &ClusterState, format: OutputFormat) -> Result<()> {
    let report = build_report(state)?;

    let rows: Vec<ReadinessRow> = report
        .nodes
        .iter()
        .map(|node| ReadinessRow {
            name: node.name.clone(),
            status: color_status(status_of(node)),
            schedulable: format_bool(node.schedulable),
            autoscaled: format_bool(!report.unmanaged.contains(&node.name)),
            since: node
                .last_transition
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    print_table(&rows, &report, format);
    if format == OutputFormat::Table && !rows.is_empty() {
        print_info(&format!(
            "{} of {} nodes ready and schedulable, {} outside autoscaled groups",
            report.usable,
            report.nodes.len(),
            report.unmanaged.len()
        ));
    }
    Ok(())
}
