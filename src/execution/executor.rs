//! Step executor - runs individual steps against the warehouse

use crate::core::sql::split_statements;
use crate::core::{Branch, DefinitionError, Step, StepKind, StepOutcome};
use crate::warehouse::result::cell_to_string;
use crate::warehouse::{HandlerRegistry, QueryResult, RowHandler, Warehouse, WarehouseError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Rows logged per statement when a step asks for its results in the logs
const LOGGED_ROWS: usize = 20;

/// Why a step failed
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Query returned no rows")]
    EmptyResult,

    #[error("Cannot read branch value: {0}")]
    InvalidBranchValue(String),

    #[error("Unknown row handler: {0}")]
    UnknownHandler(String),
}

/// Result of executing a step
#[derive(Debug, Clone, PartialEq)]
pub struct StepExecution {
    pub outcome: StepOutcome,

    /// Set for branch steps
    pub branch: Option<Branch>,
}

/// Resolve a branch from the first cell of a validation query
///
/// Numbers are failure counts (non-zero takes the true branch). Booleans and
/// the usual yes/no spellings are accepted as well.
pub fn branch_for(cell: &Value) -> Result<Branch, ExecutionError> {
    let invalid = || ExecutionError::InvalidBranchValue(cell_to_string(cell));

    match cell {
        Value::Bool(b) => Ok(Branch::from_bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(Branch::from_failure_count)
            .or_else(|| n.as_f64().map(|f| Branch::from_bool(f != 0.0)))
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if let Ok(count) = s.parse::<i64>() {
                return Ok(Branch::from_failure_count(count));
            }
            match s.as_str() {
                "true" | "t" | "yes" | "y" | "on" => Ok(Branch::True),
                "false" | "f" | "no" | "n" | "off" => Ok(Branch::False),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

/// Executes a single step
pub struct StepExecutor<W> {
    warehouse: W,
    handlers: HandlerRegistry,
}

impl<W: Warehouse> StepExecutor<W> {
    pub fn new(warehouse: W, handlers: HandlerRegistry) -> Self {
        Self {
            warehouse,
            handlers,
        }
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Execute a step and return its outcome
    pub async fn execute(&self, step: &Step) -> Result<StepExecution, ExecutionError> {
        info!("Executing step: {} ({})", step.id, step.kind);

        let sql = step.render()?;
        debug!("Rendered SQL for step {}: {}", step.id, sql);

        match step.kind {
            StepKind::ConditionalCheck => {
                let result = self.warehouse.query(&sql).await?;
                let cell = result
                    .first_row()
                    .and_then(|row| row.first())
                    .ok_or(ExecutionError::EmptyResult)?;
                let branch = branch_for(cell)?;
                info!("Step {} returned {} -> {} branch", step.id, cell_to_string(cell), branch);

                Ok(StepExecution {
                    outcome: StepOutcome::Branched {
                        value: cell_to_string(cell),
                        branch,
                    },
                    branch: Some(branch),
                })
            }
            StepKind::Assertion => {
                let result = self.warehouse.query(&sql).await?;
                step.assertion_check()
                    .evaluate(&result)
                    .map_err(ExecutionError::AssertionFailed)?;
                info!("Step {} checks passed", step.id);

                Ok(StepExecution {
                    outcome: StepOutcome::Passed,
                    branch: None,
                })
            }
            StepKind::ExecuteStatement => self.execute_statements(step, sql).await,
        }
    }

    async fn execute_statements(
        &self,
        step: &Step,
        sql: String,
    ) -> Result<StepExecution, ExecutionError> {
        let handler: Option<Arc<dyn RowHandler>> = match step.handler.as_deref() {
            Some(name) => Some(
                self.handlers
                    .get(name)
                    .ok_or_else(|| ExecutionError::UnknownHandler(name.to_string()))?,
            ),
            None => None,
        };

        let statements = if step.split_statements {
            split_statements(&sql)
        } else {
            vec![sql]
        };

        let mut total_rows = 0;
        let mut last_rows = 0;
        for (i, statement) in statements.iter().enumerate() {
            debug!("Step {} statement {}/{}", step.id, i + 1, statements.len());
            let result = self.warehouse.query(statement).await?;

            if let Some(handler) = &handler {
                handler.handle(&step.id, result.cursor());
            }
            if step.show_return_value_in_logs {
                log_rows(&step.id, &result);
            }

            total_rows += result.row_count();
            last_rows = result.row_count();
        }

        Ok(StepExecution {
            outcome: StepOutcome::Executed {
                statements: statements.len(),
                rows: if step.return_last { last_rows } else { total_rows },
            },
            branch: None,
        })
    }
}

fn log_rows(step_id: &str, result: &QueryResult) {
    info!("Step {} returned {} rows", step_id, result.row_count());
    for row in result.rows.iter().take(LOGGED_ROWS) {
        info!("  {}", result.format_row(row));
    }
    if result.row_count() > LOGGED_ROWS {
        info!("  ... ({} more rows)", result.row_count() - LOGGED_ROWS);
    }
}
