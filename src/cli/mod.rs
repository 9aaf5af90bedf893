//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    ExportCommand, HistoryCommand, ListCommand, PlanCommand, RenderCommand, RunCommand,
    ValidateCommand,
};
use std::ffi::OsString;

/// Data-quality pipelines for SQL warehouses
#[derive(Debug, Parser, Clone)]
#[command(name = "dq-pipeline")]
#[command(version)]
#[command(about = "Define, inspect and run data-quality pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// Print the rendered SQL of each step
    Render(RenderCommand),

    /// Print the steps a run would visit for given branch outcomes
    Plan(PlanCommand),

    /// Export the pipeline graph as JSON
    Export(ExportCommand),

    /// Run a pipeline
    Run(RunCommand),

    /// List built-in pipelines
    List(ListCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
