//! Execute steps hand each statement's cursor to their row handler

use crate::helpers::*;
use dq_pipeline::core::StepOutcome;
use dq_pipeline::core::StepState;
use dq_pipeline::warehouse::RowHandler;
use std::sync::Arc;

#[tokio::test]
async fn test_cursor_step_handler_sees_every_row() {
    let mut pipeline_yaml = dq_pipeline::catalog::AIRPORTS_QUALITY.to_string();
    pipeline_yaml = pipeline_yaml.replace("handler: print_rows", "handler: collect");
    let pipeline = pipeline_from_yaml(&pipeline_yaml);

    let handler = Arc::new(CollectingHandler::default());
    let result = run_pipeline_with_handlers(
        &pipeline,
        healthy_airports_warehouse(),
        vec![("collect", handler.clone() as Arc<dyn RowHandler>)],
    )
    .await;

    assert_pipeline_completed(&result);
    let rows = handler.rows.lock().unwrap();
    assert_eq!(
        *rows,
        vec![
            ("cursor-sample".to_string(), "('00M', 'Thigpen', 'Bay Springs')".to_string()),
            (
                "cursor-sample".to_string(),
                "('00R', 'Livingston Municipal', 'Livingston')".to_string()
            ),
            (
                "cursor-sample".to_string(),
                "('00V', 'Meadow Lake', 'Colorado Springs')".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_handler_runs_once_per_statement() {
    let pipeline = pipeline_from_yaml(
        r#"
name: multi-statement
steps:
  - id: samples
    kind: execute
    split_statements: true
    return_last: false
    handler: collect
    sql: |
      select * from airports limit 10;
      -- second sample
      select * from airports_v2 limit 10;
"#,
    );

    let handler = Arc::new(CollectingHandler::default());
    let result = run_pipeline_with_handlers(
        &pipeline,
        MockWarehouse::new().on("limit 10", airport_rows()),
        vec![("collect", handler.clone() as Arc<dyn RowHandler>)],
    )
    .await;

    assert_pipeline_completed(&result);
    assert_eq!(
        result.queries,
        vec!["select * from airports limit 10", "select * from airports_v2 limit 10"]
    );
    assert_eq!(handler.rows.lock().unwrap().len(), 6);
    assert!(matches!(
        result.run.step_state("samples"),
        Some(StepState::Completed {
            outcome: StepOutcome::Executed {
                statements: 2,
                rows: 6
            },
            ..
        })
    ));
}

#[tokio::test]
async fn test_unregistered_handler_fails_step() {
    let pipeline = pipeline_from_yaml(
        r#"
name: missing-handler
steps:
  - id: sample
    kind: execute
    sql: select * from airports limit 10
    handler: to_csv
"#,
    );

    let result = run_pipeline_with_mock(&pipeline, MockWarehouse::new()).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "sample", "Unknown row handler: to_csv");
    assert!(result.queries.is_empty());
}
