//! Step domain model

use crate::core::check::Assertion;
use crate::core::error::{DefinitionError, DefinitionResult};
use crate::core::template::{self, Params, TemplateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a step does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Runs a validation query and picks one of two successors
    #[serde(alias = "branch")]
    ConditionalCheck,
    /// Runs one or more statements
    #[serde(alias = "execute")]
    ExecuteStatement,
    /// Runs a query and fails the pipeline if its checks do not hold
    #[serde(alias = "assert")]
    Assertion,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::ConditionalCheck => "branch",
            StepKind::ExecuteStatement => "execute",
            StepKind::Assertion => "assert",
        };
        f.write_str(name)
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    pub kind: StepKind,

    /// SQL text with `{{ params.<name> }}` placeholders
    pub sql_template: String,

    /// Values for the template placeholders
    pub params: Params,

    /// Checks evaluated by an `Assertion` step (`Assertion::Sql` when unset)
    pub check: Option<Assertion>,

    /// Split the rendered SQL into statements and run them one by one
    pub split_statements: bool,

    /// With split statements, report only the last statement's rows
    pub return_last: bool,

    /// Log returned rows at INFO level
    pub show_return_value_in_logs: bool,

    /// Name of the row handler invoked with each statement's cursor
    pub handler: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind, sql_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            sql_template: sql_template.into(),
            params: Params::new(),
            check: None,
            split_statements: false,
            return_last: true,
            show_return_value_in_logs: false,
            handler: None,
        }
    }

    /// A branch step on a failure-count query
    pub fn branch(id: impl Into<String>, sql_template: impl Into<String>) -> Self {
        Self::new(id, StepKind::ConditionalCheck, sql_template)
    }

    pub fn execute(id: impl Into<String>, sql_template: impl Into<String>) -> Self {
        Self::new(id, StepKind::ExecuteStatement, sql_template)
    }

    /// An assertion step whose SQL comes from `check`, or from `sql_template`
    /// when the check does not generate its own
    pub fn assertion(
        id: impl Into<String>,
        check: Assertion,
        sql_template: impl Into<String>,
    ) -> Self {
        let sql_template = check.generated_sql().unwrap_or_else(|| sql_template.into());
        let mut step = Self::new(id, StepKind::Assertion, sql_template);
        step.check = Some(check);
        step
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_split_statements(mut self, return_last: bool) -> Self {
        self.split_statements = true;
        self.return_last = return_last;
        self
    }

    pub fn with_logged_results(mut self) -> Self {
        self.show_return_value_in_logs = true;
        self
    }

    pub fn is_branch(&self) -> bool {
        self.kind == StepKind::ConditionalCheck
    }

    /// The assertion this step evaluates
    pub fn assertion_check(&self) -> Assertion {
        self.check.clone().unwrap_or(Assertion::Sql)
    }

    /// Render the SQL template with this step's parameters
    pub fn render(&self) -> DefinitionResult<String> {
        template::render(&self.sql_template, &self.params).map_err(|err| match err {
            TemplateError::Missing(name) => DefinitionError::MissingParameter {
                step_id: self.id.clone(),
                name,
            },
            TemplateError::Unsupported(expression) => DefinitionError::InvalidStep {
                step_id: self.id.clone(),
                message: format!("unsupported template expression '{{{{ {} }}}}'", expression),
            },
        })
    }

    /// Check the step's own configuration
    pub fn validate(&self) -> DefinitionResult<()> {
        let invalid = |message: &str| DefinitionError::InvalidStep {
            step_id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("step id must not be empty"));
        }
        if self.sql_template.trim().is_empty() {
            return Err(invalid("step has no SQL"));
        }
        match (&self.kind, &self.check) {
            (StepKind::Assertion, Some(check)) => check.validate(&self.id)?,
            (StepKind::Assertion, None) => {}
            (_, Some(_)) => return Err(invalid("only assertion steps may carry checks")),
            (_, None) => {}
        }
        Ok(())
    }
}
