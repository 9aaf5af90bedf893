//! Pipeline configuration from YAML

use crate::core::check::Assertion;
use crate::core::error::{DefinitionError, DefinitionResult};
use crate::core::pipeline::{
    DefaultArgs, Pipeline, PipelineBuilder, PipelineMeta, DEFAULT_CONNECTION_ID,
};
use crate::core::step::{Step, StepKind};
use crate::core::template::Params;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Warehouse connection id
    #[serde(default = "default_connection_id")]
    pub connection_id: String,

    /// Schedule expression passed through to the orchestrator (e.g. `@daily`)
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default)]
    pub catchup: bool,

    #[serde(default)]
    pub paused_on_creation: bool,

    #[serde(default)]
    pub default_args: DefaultArgs,

    /// Parameters shared by every step; step-level values win
    #[serde(default)]
    pub params: Params,

    /// Pipeline steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// `branch`, `execute` or `assert`
    pub kind: StepKind,

    /// SQL template; optional for column and table checks
    #[serde(default)]
    pub sql: Option<String>,

    #[serde(default)]
    pub params: Params,

    /// Assertion evaluated by `assert` steps
    #[serde(default)]
    pub check: Option<Assertion>,

    #[serde(default)]
    pub split_statements: bool,

    #[serde(default = "default_true")]
    pub return_last: bool,

    #[serde(default)]
    pub show_return_value_in_logs: bool,

    /// Row handler name, e.g. `print_rows`
    #[serde(default)]
    pub handler: Option<String>,

    /// Step to run next
    #[serde(default)]
    pub next: Option<String>,

    /// Successors of a `branch` step
    #[serde(default)]
    pub branch: Option<BranchConfig>,
}

/// Two-armed edge of a branch step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Taken when the check reports failures
    pub on_true: String,
    /// Taken when the check reports none
    pub on_false: String,
}

fn default_connection_id() -> String {
    DEFAULT_CONNECTION_ID.to_string()
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without building the graph, so parameters can still be overridden
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse pipeline YAML")
    }

    /// Validate the pipeline configuration by building it
    pub fn validate(&self) -> Result<()> {
        self.to_pipeline()?;
        Ok(())
    }

    /// Override a parameter everywhere it is set
    pub fn override_param(&mut self, name: &str, value: &str) {
        self.params.insert(name, value);
        for step in &mut self.steps {
            if step.params.contains(name) {
                step.params.insert(name, value);
            }
        }
    }

    fn meta(&self) -> PipelineMeta {
        PipelineMeta {
            name: self.name.clone(),
            description: self.description.clone(),
            connection_id: self.connection_id.clone(),
            schedule: self.schedule.clone(),
            catchup: self.catchup,
            paused_on_creation: self.paused_on_creation,
            default_args: self.default_args.clone(),
        }
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> DefinitionResult<Pipeline> {
        let mut builder = PipelineBuilder::with_meta(self.meta());

        for step_config in &self.steps {
            builder.define(step_config.to_step(&self.params)?)?;
        }

        for step_config in &self.steps {
            if let Some(next) = &step_config.next {
                builder.add_edge(&step_config.id, next)?;
            }
            if let Some(branch) = &step_config.branch {
                builder.add_conditional_edges(&step_config.id, &branch.on_true, &branch.on_false)?;
            }
        }

        builder.build()
    }
}

impl StepConfig {
    fn to_step(&self, defaults: &Params) -> DefinitionResult<Step> {
        let invalid = |message: &str| DefinitionError::InvalidStep {
            step_id: self.id.clone(),
            message: message.to_string(),
        };

        let sql = self.sql.clone().unwrap_or_default();
        let mut step = match (self.kind, &self.check) {
            (StepKind::Assertion, check) => {
                let check = check.clone().unwrap_or(Assertion::Sql);
                if check.needs_sql() && sql.trim().is_empty() {
                    return Err(invalid("assertion needs `sql`"));
                }
                if !check.needs_sql() && self.sql.is_some() {
                    return Err(invalid("column and table checks generate their own SQL"));
                }
                Step::assertion(&self.id, check, sql)
            }
            (_, Some(_)) => return Err(invalid("only assert steps take a `check`")),
            (kind, None) => {
                if sql.trim().is_empty() {
                    return Err(invalid("step needs `sql`"));
                }
                Step::new(&self.id, kind, sql)
            }
        };

        let mut params = self.params.clone();
        params.merge_defaults(defaults);
        step.params = params;
        step.split_statements = self.split_statements;
        step.return_last = self.return_last;
        step.show_return_value_in_logs = self.show_return_value_in_logs;
        step.handler = self.handler.clone();

        Ok(step)
    }
}
