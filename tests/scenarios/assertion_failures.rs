//! A failed assertion stops the run and skips everything after it

use crate::helpers::*;
use dq_pipeline::core::ExecutionStatus;
use dq_pipeline::execution::engine::SKIP_UPSTREAM_FAILED;
use dq_pipeline::execution::ExecutionEvent;
use dq_pipeline::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};
use dq_pipeline::warehouse::QueryResult;
use serde_json::json;

#[tokio::test]
async fn test_threshold_violation_stops_pipeline() {
    let pipeline = builtin_pipeline("airports-quality");
    let warehouse = MockWarehouse::new()
        .on_value("num_rows", json!(120))
        .on_value("missing_airports", json!(0))
        .on(
            "AS check_name",
            QueryResult::new(
                vec!["check_name", "check_result"],
                vec![vec![json!("row_count_check"), json!(1)]],
            ),
        )
        .on_value("count(*) from", json!(120));

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "threshold-check", "120 is outside threshold [3000, 4000]");
    assert_execution_order(
        &result,
        &[
            "create-dataset",
            "table-row-count-check",
            "check-num-rows",
            "value-check",
            "threshold-check",
        ],
    );
    for step in ["column-check", "check-iata-length", "query-sample", "cursor-sample"] {
        assert_step_skipped(&result, step, SKIP_UPSTREAM_FAILED);
    }
    assert_eq!(result.run.progress(), 1.0);
}

#[tokio::test]
async fn test_table_check_failure() {
    let pipeline = builtin_pipeline("demo-dag");
    let warehouse = MockWarehouse::new().on(
        "AS check_name",
        QueryResult::new(
            vec!["check_name", "check_result"],
            vec![vec![json!("row_count_check"), json!(0)]],
        ),
    );

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;

    assert_pipeline_failed(&result);
    assert_step_failed(
        &result,
        "dw_table_checks",
        "row_count_check: 'COUNT(*) between 3000 and 4000' is false",
    );
    assert!(matches!(
        result.events.last(),
        Some(ExecutionEvent::PipelineCompleted {
            status: ExecutionStatus::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_column_check_reports_every_failed_check() {
    let pipeline = builtin_pipeline("demo-dag");
    // Rules are matched in order, so the failing column result goes first
    let warehouse = MockWarehouse::new()
        .on(
            "AS col_name",
            QueryResult::new(
                vec!["col_name", "check_type", "check_result"],
                vec![
                    vec![json!("iata"), json!("distinct_check"), json!(1)],
                    vec![json!("iata"), json!("null_check"), json!(4)],
                    vec![json!("iata"), json!("unique_check"), json!(0)],
                ],
            ),
        )
        .then(airports_warehouse(0, 0));

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;

    assert_pipeline_failed(&result);
    assert_step_failed(
        &result,
        "dw_column_checks",
        "iata.distinct_check: got 1, expected geq_to 2",
    );
    assert_step_failed(&result, "dw_column_checks", "iata.null_check: got 4, expected equal_to 0");
}

#[tokio::test]
async fn test_warehouse_error_is_recorded_in_history() {
    let pipeline = builtin_pipeline("airports-quality");
    let warehouse = MockWarehouse::new().on_error(
        "drop table",
        "AuthorizationException: User 'etl' does not have privileges",
    );

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;
    assert_pipeline_failed(&result);
    assert_eq!(result.queries.len(), 1);

    let store = InMemoryPersistence::new();
    let summary = create_summary(&result.run);
    store.save_execution(&summary).await.unwrap();

    let saved = store.list_executions("airports-quality").await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].failed_step.as_deref(), Some("create-dataset"));
    assert!(saved[0]
        .error
        .as_deref()
        .unwrap()
        .contains("does not have privileges"));
    assert_eq!(saved[0].skipped_steps, 11);
}
