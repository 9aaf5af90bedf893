//! CLI command definitions

use crate::catalog;
use crate::core::config::PipelineConfig;
use crate::core::Branch;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Where a pipeline definition comes from
#[derive(Debug, Args, Clone)]
pub struct PipelineSource {
    /// Path to pipeline YAML file
    #[arg(short, long, conflicts_with = "builtin")]
    pub file: Option<PathBuf>,

    /// Name of a built-in pipeline (see `list`)
    #[arg(short, long)]
    pub builtin: Option<String>,

    /// Parameter overrides (key=value)
    #[arg(short, long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,
}

impl PipelineSource {
    /// Load the definition, apply parameter overrides, then validate it
    pub fn load(&self) -> Result<PipelineConfig> {
        let yaml = match (&self.file, &self.builtin) {
            (Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read pipeline file {}", path.display()))?,
            (None, Some(name)) => match catalog::source(name) {
                Some(yaml) => yaml.to_string(),
                None => bail!(
                    "Unknown built-in pipeline: {} (available: {})",
                    name,
                    catalog::names().join(", ")
                ),
            },
            (None, None) => bail!("Specify a pipeline with --file or --builtin"),
        };

        let mut config = PipelineConfig::parse(&yaml)?;
        for (key, value) in &self.params {
            config.override_param(key, value);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub source: PipelineSource,

    /// Output the parsed configuration in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print rendered SQL
#[derive(Debug, Args, Clone)]
pub struct RenderCommand {
    #[command(flatten)]
    pub source: PipelineSource,

    /// Only render this step
    #[arg(long)]
    pub step: Option<String>,
}

/// Print the steps a run would visit
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub source: PipelineSource,

    /// Assumed branch outcome (step=true|false); unlisted branches are false
    #[arg(long = "branch", value_parser = parse_branch)]
    pub branches: Vec<(String, Branch)>,
}

/// Export the pipeline graph as JSON
#[derive(Debug, Args, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub source: PipelineSource,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run a pipeline against the warehouse
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub source: PipelineSource,

    /// Connections file (defaults to $DQ_PIPELINE_CONNECTIONS or the user config dir)
    #[arg(long)]
    pub connections: Option<PathBuf>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// List built-in pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

/// Parse step=true|false pairs
pub fn parse_branch(s: &str) -> Result<(String, Branch), String> {
    let (step, value) = parse_key_value(s)?;
    let branch = match value.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Branch::True,
        "false" | "f" | "no" | "0" => Branch::False,
        other => return Err(format!("Invalid branch value for {}: {}", step, other)),
    };
    Ok((step, branch))
}
