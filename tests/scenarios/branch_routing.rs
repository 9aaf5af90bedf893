//! Branch steps route on the failure count of their validation query

use crate::helpers::*;
use dq_pipeline::core::Branch;
use dq_pipeline::execution::ExecutionEvent;
use dq_pipeline::execution::engine::SKIP_BRANCH_NOT_TAKEN;

#[tokio::test]
async fn test_clean_data_skips_both_cleansing_steps() {
    let pipeline = builtin_pipeline("airports-quality");

    let result = run_pipeline_with_mock(&pipeline, healthy_airports_warehouse()).await;

    assert_pipeline_completed(&result);
    assert_execution_order(
        &result,
        &[
            "create-dataset",
            "table-row-count-check",
            "check-num-rows",
            "value-check",
            "threshold-check",
            "column-check",
            "check-iata-length",
            "check-quotation-mark",
            "query-sample",
            "cursor-sample",
        ],
    );
    assert_step_skipped(&result, "clean-iata-length", SKIP_BRANCH_NOT_TAKEN);
    assert_step_skipped(&result, "clean-quotation-mark", SKIP_BRANCH_NOT_TAKEN);
    assert!(!result.queries.iter().any(|q| q.starts_with("update") || q.starts_with("delete")));
}

#[tokio::test]
async fn test_failures_run_cleansing_then_reconverge() {
    let pipeline = builtin_pipeline("airports-quality");

    let result = run_pipeline_with_mock(&pipeline, airports_warehouse(12, 0)).await;

    assert_pipeline_completed(&result);
    assert_execution_order(
        &result,
        &[
            "create-dataset",
            "table-row-count-check",
            "check-num-rows",
            "value-check",
            "threshold-check",
            "column-check",
            "check-iata-length",
            "clean-iata-length",
            "check-quotation-mark",
            "query-sample",
            "cursor-sample",
        ],
    );
    assert_step_skipped(&result, "clean-quotation-mark", SKIP_BRANCH_NOT_TAKEN);
    assert!(result
        .queries
        .iter()
        .any(|q| q.starts_with("delete from airflow_sql.airports")));
}

#[tokio::test]
async fn test_both_branches_true() {
    let pipeline = builtin_pipeline("airports-quality");

    let result = run_pipeline_with_mock(&pipeline, airports_warehouse(1, 7)).await;

    assert_pipeline_completed(&result);
    assert_eq!(result.run.visited.len(), 12);
    assert_eq!(result.run.skipped_steps(), 0);

    let selected: Vec<(String, Branch)> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::BranchSelected { step_id, branch, .. } => {
                Some((step_id.clone(), *branch))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        selected,
        vec![
            ("check-iata-length".to_string(), Branch::True),
            ("check-quotation-mark".to_string(), Branch::True),
        ]
    );
}

#[tokio::test]
async fn test_demo_dag_quotation_branch() {
    let pipeline = builtin_pipeline("demo-dag");
    let warehouse = airports_warehouse(0, 2);

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;

    assert_pipeline_completed(&result);
    assert_execution_order(
        &result,
        &[
            "dataset-create-cdw",
            "dw_table_checks",
            "dataset-check-num-rows",
            "dataset-check-quotation_mark",
            "dataset-qa-quotation_mark",
            "dw_column_checks",
            "dataset-query-cdw",
            "dataset-cursor-cdw",
        ],
    );
}

#[tokio::test]
async fn test_unreadable_branch_value_fails_the_run() {
    let pipeline = pipeline_from_yaml(
        r#"
name: unreadable
steps:
  - id: check
    kind: branch
    sql: select status from checks
    branch:
      on_true: fix
      on_false: done
  - id: fix
    kind: execute
    sql: select 1
    next: done
  - id: done
    kind: execute
    sql: select 2
"#,
    );
    let warehouse = MockWarehouse::new().on_value("status", serde_json::json!("unknown"));

    let result = run_pipeline_with_mock(&pipeline, warehouse).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "check", "Cannot read branch value: unknown");
    assert_eq!(result.run.skipped_steps(), 2);
}
