//! Test utility functions for dq-pipeline scenarios

use async_trait::async_trait;
use dq_pipeline::core::config::PipelineConfig;
use dq_pipeline::core::{ExecutionStatus, Pipeline, RunState, StepState};
use dq_pipeline::execution::{ExecutionEngine, ExecutionEvent};
use dq_pipeline::warehouse::{Cursor, QueryResult, RowHandler, Warehouse, WarehouseError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Canned response for statements containing a pattern
enum Response {
    Rows(QueryResult),
    Error(String),
}

/// Mock warehouse that answers by SQL substring and records every statement
///
/// Rules are checked in the order they were added; statements matching no
/// rule return an empty result.
#[derive(Default)]
pub struct MockWarehouse {
    rules: Vec<(String, Response)>,
    queries: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, result: QueryResult) -> Self {
        self.rules.push((pattern.to_string(), Response::Rows(result)));
        self
    }

    /// Single-cell result, the shape of count and branch queries
    pub fn on_value(self, pattern: &str, value: Value) -> Self {
        self.on(pattern, QueryResult::single_value("result", value))
    }

    pub fn on_error(mut self, pattern: &str, message: &str) -> Self {
        self.rules.push((pattern.to_string(), Response::Error(message.to_string())));
        self
    }

    /// Append another mock's rules after this one's
    pub fn then(mut self, other: MockWarehouse) -> Self {
        self.rules.extend(other.rules);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.queries.lock().unwrap().push(sql.to_string());

        for (pattern, response) in &self.rules {
            if sql.contains(pattern.as_str()) {
                return match response {
                    Response::Rows(result) => Ok(result.clone()),
                    Response::Error(message) => Err(WarehouseError::Query(message.clone())),
                };
            }
        }
        Ok(QueryResult::empty())
    }
}

/// Row handler that keeps every row it sees, formatted, per step
#[derive(Default)]
pub struct CollectingHandler {
    pub rows: Mutex<Vec<(String, String)>>,
}

impl RowHandler for CollectingHandler {
    fn handle(&self, step_id: &str, mut cursor: Cursor<'_>) {
        let mut rows = self.rows.lock().unwrap();
        while let Some(row) = cursor.fetch_one() {
            rows.push((step_id.to_string(), cursor.format_row(row)));
        }
    }
}

/// Rows of the airports sample used by cursor steps
pub fn airport_rows() -> QueryResult {
    QueryResult::new(
        vec!["iata", "airport", "city"],
        vec![
            vec![json!("00M"), json!("Thigpen"), json!("Bay Springs")],
            vec![json!("00R"), json!("Livingston Municipal"), json!("Livingston")],
            vec![json!("00V"), json!("Meadow Lake"), json!("Colorado Springs")],
        ],
    )
}

/// A warehouse under which every check of the airports pipeline passes
/// and no branch reports failures
pub fn healthy_airports_warehouse() -> MockWarehouse {
    airports_warehouse(0, 0)
}

pub fn airports_warehouse(bad_iata: i64, bad_quotes: i64) -> MockWarehouse {
    MockWarehouse::new()
        .on("update ", QueryResult::empty())
        .on("delete from", QueryResult::empty())
        .on(
            "AS check_name",
            QueryResult::new(
                vec!["check_name", "check_result"],
                vec![vec![json!("row_count_check"), json!(1)]],
            ),
        )
        .on(
            "AS col_name",
            QueryResult::new(
                vec!["col_name", "check_type", "check_result"],
                vec![
                    vec![json!("iata"), json!("distinct_check"), json!(3376)],
                    vec![json!("iata"), json!("null_check"), json!(0)],
                    vec![json!("iata"), json!("unique_check"), json!(0)],
                ],
            ),
        )
        .on_value("num_rows", json!(3376))
        .on_value("missing_airports", json!(0))
        .on_value("length(iata)", json!(bad_iata))
        .on_value("rlike", json!(bad_quotes))
        .on("limit 10", airport_rows())
        .on_value("count(*) from", json!(3376))
}

pub fn builtin_pipeline(name: &str) -> Pipeline {
    dq_pipeline::catalog::builtin(name)
        .and_then(|config| Ok(config.to_pipeline()?))
        .unwrap_or_else(|e| panic!("Failed to load built-in pipeline {}: {}", name, e))
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .and_then(|config| Ok(config.to_pipeline()?))
        .unwrap_or_else(|e| panic!("Failed to parse pipeline YAML: {}", e))
}

/// Test result from running a pipeline
pub struct PipelineTestResult {
    pub run: RunState,
    pub events: Vec<ExecutionEvent>,
    pub queries: Vec<String>,
}

impl PipelineTestResult {
    pub fn is_success(&self) -> bool {
        self.run.status == ExecutionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.run.status == ExecutionStatus::Failed
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} - visited {:?}, failed {:?}",
            self.run.status,
            self.run.visited,
            self.run.failed_step()
        )
    }
}

/// Run a pipeline against a mock warehouse
pub async fn run_pipeline_with_mock(
    pipeline: &Pipeline,
    warehouse: MockWarehouse,
) -> PipelineTestResult {
    run_pipeline_with_handlers(pipeline, warehouse, Vec::new()).await
}

/// Run a pipeline with extra row handlers registered
pub async fn run_pipeline_with_handlers(
    pipeline: &Pipeline,
    warehouse: MockWarehouse,
    handlers: Vec<(&str, Arc<dyn RowHandler>)>,
) -> PipelineTestResult {
    let warehouse = Arc::new(warehouse);
    let mut engine = ExecutionEngine::new(warehouse.clone());
    for (name, handler) in handlers {
        engine.register_handler(name, handler);
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let run = engine.execute(pipeline).await;
    let events = events.lock().unwrap().clone();

    PipelineTestResult {
        run,
        events,
        queries: warehouse.queries(),
    }
}

/// Assert pipeline completed successfully
pub fn assert_pipeline_completed(result: &PipelineTestResult) {
    assert!(
        result.is_success(),
        "Pipeline should be completed, but was: {}",
        result.summary()
    );
}

/// Assert pipeline failed
pub fn assert_pipeline_failed(result: &PipelineTestResult) {
    assert!(
        result.is_failed(),
        "Pipeline should have failed, but was: {}",
        result.summary()
    );
}

/// Assert the steps that ran, in order
pub fn assert_execution_order(result: &PipelineTestResult, expected_order: &[&str]) {
    assert_eq!(
        result.run.visited, expected_order,
        "Expected execution order: {:?}\nActual: {:?}",
        expected_order, result.run.visited
    );
}

/// Assert a step failed with an error containing `expected_error`
pub fn assert_step_failed(result: &PipelineTestResult, step_id: &str, expected_error: &str) {
    match result.run.step_state(step_id) {
        Some(StepState::Failed { error, .. }) => assert!(
            error.contains(expected_error),
            "Step '{}' error:\n{}\n\ndoes not contain:\n{}",
            step_id,
            error,
            expected_error
        ),
        other => panic!("Step '{}' should have failed, but was: {:?}", step_id, other),
    }
}

/// Assert a step was skipped for the given reason
pub fn assert_step_skipped(result: &PipelineTestResult, step_id: &str, reason: &str) {
    match result.run.step_state(step_id) {
        Some(StepState::Skipped { reason: actual }) => assert_eq!(actual, reason),
        other => panic!("Step '{}' should be skipped, but was: {:?}", step_id, other),
    }
}
