//! Template synthesis for every node group of a cluster state

use anyhow::{bail, Context, Result};
use simulator_lib::models::{NodeGroupId, NodeInfo, TemplateCache};
use simulator_lib::naming::SequentialNameSource;
use simulator_lib::resources::node_cores_and_memory;
use simulator_lib::simulator::BasicPredicateChecker;
use simulator_lib::taints::parse_taint_keys;
use simulator_lib::template::{suppressor_for_provider, TemplateSynthesizer};
use simulator_lib::ClusterState;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{format_bytes, print_table, print_warning, OutputFormat};

#[derive(Debug, Default)]
pub struct TemplateOptions {
    pub group: Option<String>,
    pub ignored_taints: String,
    pub force_cloud_template: bool,
    pub seed: Option<u64>,
}

/// Row for templates table
#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "Node Group")]
    node_group: String,
    #[tabled(rename = "Template Node")]
    node: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Pods")]
    pods: usize,
    #[tabled(rename = "Taints")]
    taints: String,
}

fn build_templates(
    state: &ClusterState,
    options: &TemplateOptions,
) -> Result<HashMap<NodeGroupId, NodeInfo>> {
    let mut builder = TemplateSynthesizer::builder()
        .ignored_taints(parse_taint_keys(&options.ignored_taints))
        .force_cloud_template(options.force_cloud_template)
        .suppressor(Arc::from(suppressor_for_provider(&state.provider)));
    if let Some(seed) = options.seed {
        builder = builder.name_source(Arc::new(SequentialNameSource::starting_at(seed)));
    }
    let synthesizer = builder.build();

    let mut cache = TemplateCache::new();
    let templates = synthesizer
        .build_templates_for_groups(
            &state.nodes,
            &mut cache,
            &state.cloud_provider(),
            &state.pods_by_node(),
            &state.daemonsets,
            &BasicPredicateChecker,
        )
        .context("Template synthesis failed")?;
    Ok(templates)
}

fn row(node_group: &str, info: &NodeInfo) -> Result<TemplateRow> {
    let (cores, memory) = node_cores_and_memory(&info.node)
        .with_context(|| format!("Invalid capacity on template for {}", node_group))?;
    let taints = info
        .node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|t| format!("{}:{}", t.key, t.effect))
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string());
    Ok(TemplateRow {
        node_group: node_group.to_string(),
        node: info.node_name().to_string(),
        cpu: cores.to_string(),
        memory: format_bytes(memory),
        pods: info.pods.len(),
        taints,
    })
}

/// Build and print the templates, optionally for a single group
pub fn show_templates(
    state: &ClusterState,
    options: &TemplateOptions,
    format: OutputFormat,
) -> Result<()> {
    let templates: BTreeMap<_, _> = build_templates(state, options)?.into_iter().collect();

    let selected: BTreeMap<_, _> = match &options.group {
        Some(group) => match templates.get(group) {
            Some(info) => BTreeMap::from([(group.clone(), info.clone())]),
            None => bail!("No template could be built for node group {}", group),
        },
        None => templates,
    };

    let rows = selected
        .iter()
        .map(|(group, info)| row(group, info))
        .collect::<Result<Vec<_>>>()?;

    print_table(&rows, &selected, format);
    if format == OutputFormat::Table && options.group.is_none() {
        let missing: Vec<&str> = state
            .node_groups
            .iter()
            .map(|g| g.id.as_str())
            .filter(|id| !selected.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            print_warning(&format!("No template for: {}", missing.join(", ")));
        }
    }
    Ok(())
}
