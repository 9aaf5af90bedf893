//! Parameters are substituted into SQL before it reaches the warehouse

use crate::helpers::*;
use dq_pipeline::core::config::PipelineConfig;

#[tokio::test]
async fn test_params_reach_the_warehouse() {
    let pipeline = builtin_pipeline("airports-quality");

    let result = run_pipeline_with_mock(&pipeline, healthy_airports_warehouse()).await;

    assert_pipeline_completed(&result);
    assert_eq!(result.queries[0], "drop table if exists airflow_sql.airports");
    assert!(result.queries[1].contains("select * from airlinedata.airports_csv"));
    assert!(result.queries.iter().all(|q| !q.contains("{{")));
}

#[tokio::test]
async fn test_overridden_params_reach_the_warehouse() {
    let mut config = dq_pipeline::catalog::builtin("airports-quality").unwrap();
    config.override_param("db", "staging");
    config.override_param("table", "airports_v2");
    let pipeline = config.to_pipeline().unwrap();

    let result = run_pipeline_with_mock(&pipeline, healthy_airports_warehouse()).await;

    assert_pipeline_completed(&result);
    assert_eq!(result.queries[0], "drop table if exists staging.airports_v2");
    assert!(result
        .queries
        .iter()
        .any(|q| q.contains("AS col_name") && q.contains("FROM staging.airports_v2")));
    assert!(!result.queries.iter().any(|q| q.contains("airflow_sql")));
}

#[tokio::test]
async fn test_step_params_shadow_pipeline_params() {
    let pipeline = pipeline_from_yaml(
        r#"
name: shadowing
params:
  table: airports
steps:
  - id: first
    kind: execute
    sql: select * from {{ params.table }}
    next: second
  - id: second
    kind: execute
    sql: select * from {{ params.table }}
    params:
      table: airports_archive
"#,
    );

    let result = run_pipeline_with_mock(&pipeline, MockWarehouse::new()).await;

    assert_eq!(
        result.queries,
        vec!["select * from airports", "select * from airports_archive"]
    );
}

#[test]
fn test_missing_param_is_rejected_before_running() {
    let yaml = r#"
name: missing
params:
  db: airflow
steps:
  - id: query
    kind: execute
    sql: select * from {{ params.db }}.{{ params.table }}
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("table"), "unexpected error: {}", err);
}
