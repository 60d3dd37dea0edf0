//! Node template simulator CLI
//!
//! Reads a cluster state file and reports node readiness, synthesized
//! node group templates and drain verdicts.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{drain, readiness, templates};
use simulator_lib::ClusterState;
use std::process::ExitCode;

/// Node template simulator CLI
#[derive(Parser)]
#[command(name = "casim")]
#[command(author, version, about = "CLI for the Node Template Simulator", long_about = None)]
pub struct Cli {
    /// Cluster state JSON file (can also be set via SIMULATOR_CLUSTER_STATE_PATH)
    #[arg(long, env = "SIMULATOR_CLUSTER_STATE_PATH", default_value = "cluster-state.json")]
    pub state: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Log synthesis and drain decisions to stderr
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show readiness of every node
    Readiness,

    /// Build a template node for every node group
    Templates {
        /// Only show this node group
        #[arg(long, short)]
        group: Option<String>,

        /// Comma separated taint keys to strip from templates
        #[arg(long, default_value = "")]
        ignored_taints: String,

        /// Build every template from the cloud provider
        #[arg(long)]
        force_cloud_template: bool,

        /// Number template names from this value instead of randomly
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check whether a node can be drained
    Drain {
        /// Node name
        node: String,

        /// Look up controllers and their replica counts
        #[arg(long)]
        detailed: bool,

        /// Minimum replicas a controller must keep (detailed only)
        #[arg(long, default_value_t = 0)]
        min_replica_count: i32,

        /// Allow evicting kube-system pods without a disruption budget
        #[arg(long)]
        allow_system_pods: bool,

        /// Allow evicting pods with local storage
        #[arg(long)]
        allow_local_storage: bool,
    },
}

fn init_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let state = ClusterState::load(&cli.state)
        .with_context(|| format!("Failed to load cluster state from {}", cli.state))?;

    match cli.command {
        Commands::Readiness => readiness::show_readiness(&state, cli.format)?,
        Commands::Templates {
            group,
            ignored_taints,
            force_cloud_template,
            seed,
        } => {
            let options = templates::TemplateOptions {
                group,
                ignored_taints,
                force_cloud_template,
                seed,
            };
            templates::show_templates(&state, &options, cli.format)?;
        }
        Commands::Drain {
            node,
            detailed,
            min_replica_count,
            allow_system_pods,
            allow_local_storage,
        } => {
            let options = drain::DrainArgs {
                detailed,
                min_replica_count,
                allow_system_pods,
                allow_local_storage,
            };
            if !drain::check_drain(&state, &node, &options, cli.format)? {
                return Ok(ExitCode::from(drain::EXIT_BLOCKED));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
