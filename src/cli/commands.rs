use crate::config::{normalize_capacity, parse_connections, ConfigError, DeployConfig};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Dependency-aware deployment of Fabric workspace artifacts
#[derive(Parser, Debug)]
#[command(
    name = "fabric-deploy",
    about = "Deploy Fabric workspace artifacts from a source repository",
    version,
    author,
    long_about = "fabric-deploy reconciles a Fabric workspace with the item folders of one \
                  repository layer. It creates the workspace when missing, reconciles its \
                  membership, and publishes lakehouses, eventhouses, notebooks and data \
                  pipelines in dependency order."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Deploy a repository layer to a workspace",
        long_about = "Resolves or creates the workspace, reconciles its members and publishes \
                      every item of the layer. Settings default to FABRIC_DEPLOY_* environment \
                      variables; flags override them.\n\n\
                      Examples:\n  \
                      fabric-deploy deploy --workspace Sales\n  \
                      fabric-deploy deploy --workspace Sales --layer Data_Ingestion\n  \
                      fabric-deploy deploy --format json --output report.json"
    )]
    Deploy(DeployArgs),

    #[command(
        about = "Show what a deployment would publish",
        long_about = "Scans the layer and computes the pipeline publish order without \
                      contacting the service.\n\n\
                      Examples:\n  \
                      fabric-deploy plan\n  \
                      fabric-deploy plan /path/to/repo --layer Operations --format yaml"
    )]
    Plan(PlanArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct DeployArgs {
    #[arg(short = 'w', long, value_name = "NAME", help = "Target workspace name")]
    pub workspace: Option<String>,

    #[arg(short = 'l', long, value_name = "LAYER", help = "Layer folder under ARM/")]
    pub layer: Option<String>,

    #[arg(long, value_name = "PATH", help = "Repository root holding ARM/")]
    pub artifact_root: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ID",
        help = "Capacity for a new workspace (empty or 'none' means trial)"
    )]
    pub capacity_id: Option<String>,

    #[arg(
        long,
        value_name = "DECL",
        help = "Member declaration: '|'-separated JSON objects"
    )]
    pub members: Option<String>,

    #[arg(long, value_name = "JSON", help = "Connections document")]
    pub connections: Option<String>,

    #[arg(
        long,
        value_name = "N",
        help = "Mutating calls allowed per rate window"
    )]
    pub rate_limit: Option<u32>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

impl DeployArgs {
    /// Overrides environment-derived settings with the flags that were given
    pub fn apply(&self, config: &mut DeployConfig) -> Result<(), ConfigError> {
        if let Some(workspace) = &self.workspace {
            config.workspace_name = workspace.trim().to_string();
        }
        if let Some(layer) = &self.layer {
            config.layer = layer.trim().to_string();
        }
        if let Some(root) = &self.artifact_root {
            config.artifact_root = root.clone();
        }
        if let Some(capacity) = &self.capacity_id {
            config.capacity_id = normalize_capacity(Some(capacity));
        }
        if let Some(members) = &self.members {
            config.set_members(members)?;
        }
        if let Some(connections) = &self.connections {
            config.connections = parse_connections(connections)?;
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_limit = rate_limit;
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(
        value_name = "PATH",
        help = "Repository root holding ARM/ (defaults to current directory)"
    )]
    pub artifact_root: Option<PathBuf>,

    #[arg(
        short = 'l',
        long,
        value_name = "LAYER",
        default_value = "Operations",
        help = "Layer folder under ARM/"
    )]
    pub layer: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
