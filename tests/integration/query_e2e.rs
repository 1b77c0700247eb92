//! Full query runs over the sales dataset.
//!
//! Task lists are written the way a query decomposer emits them (JSON
//! records) and run through `run_query` with the table interpreter.

use std::sync::Arc;

use serde_json::json;

use qpar::aggregator::{Aggregator, FormattedResult, ResponseStatus};
use qpar::core::TaskStatus;
use qpar::interpreter::TaskInterpreter;
use qpar::pipeline::{parse_tasks, run_query};
use qpar::{Error, TableInterpreter};

use crate::fixtures::sales_dataset;

fn interpreter() -> Arc<dyn TaskInterpreter> {
    Arc::new(TableInterpreter::new(sales_dataset()))
}

/// "Total sales by region for 2023"
#[tokio::test]
async fn test_grouped_sum() {
    let tasks = parse_tasks(
        r#"[
            {"task_id": "T1", "operation": "filter",
             "conditions": [{"field": "year", "operator": "=", "value": 2023}]},
            {"task_id": "T2", "operation": "group", "group_by": ["region"], "depends_on": ["T1"]},
            {"task_id": "T3", "operation": "aggregate", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T2"]}
        ]"#,
    )
    .unwrap();

    let outcome = run_query(tasks, interpreter(), 4).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.plan.total_layers(), 3);

    let response = outcome.respond("Total sales by region for 2023", &Aggregator::default());
    assert_eq!(response.status, ResponseStatus::Success);

    let FormattedResult::Table {
        columns,
        data,
        statistics,
        ..
    } = &response.result
    else {
        panic!("Expected table, got {:?}", response.result);
    };
    assert_eq!(columns, &vec!["region".to_string(), "sales".to_string()]);
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["region"], json!("East"));
    assert_eq!(data[0]["sales"], json!(2750.0));
    assert_eq!(data[1]["sales"], json!(2300.0));
    assert_eq!(data[2]["sales"], json!(1250.0));
    assert_eq!(statistics["sales"].sum, 6300.0);

    let summary = response.summary();
    assert!(summary.contains("Result Type: Table"));
    assert!(summary.contains("Columns: region, sales"));
}

/// "Average sales where discount < 0.2"
#[tokio::test]
async fn test_filtered_scalar() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "filter",
             "conditions": [{"field": "discount", "operator": "<", "value": 0.2}]},
            {"id": "T2", "operation": "aggregate", "agg_type": "mean",
             "agg_field": "sales", "depends_on": ["T1"]}
        ]"#,
    )
    .unwrap();

    let outcome = run_query(tasks, interpreter(), 2).await.unwrap();
    let response = outcome.respond("average discounted sales", &Aggregator::default());

    // 1200, 800, 400, 950, 700, 2100, 500
    match &response.result {
        FormattedResult::Scalar {
            value,
            formatted_value,
        } => {
            assert!((value - 950.0).abs() < 1e-9);
            assert_eq!(formatted_value, "950.00");
        }
        other => panic!("Expected scalar, got {:?}", other),
    }
}

/// "Compare 2022 and 2023 sales": two independent branches feeding a compare.
#[tokio::test]
async fn test_parallel_branches_compare() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "filter",
             "conditions": [{"field": "year", "operator": "=", "value": 2022}]},
            {"id": "T2", "operation": "filter",
             "conditions": [{"field": "year", "operator": "=", "value": 2023}]},
            {"id": "T3", "operation": "aggregate", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T1"]},
            {"id": "T4", "operation": "aggregate", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T2"]},
            {"id": "T5", "operation": "compare", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T3", "T4"]}
        ]"#,
    )
    .unwrap();

    let outcome = run_query(tasks, interpreter(), 4).await.unwrap();
    assert_eq!(
        outcome.plan.layer_ids(),
        vec![vec!["T1", "T2"], vec!["T3", "T4"], vec!["T5"]]
    );
    assert_eq!(outcome.metrics.processors_used, 2);
    assert_eq!(outcome.metrics.tasks_executed, 5);

    let t5 = &outcome.terminal[&qpar::TaskId::from("T5")];
    let table = t5.payload.as_ref().unwrap().to_table().unwrap();
    assert_eq!(table.columns, vec!["task", "sales", "difference"]);
    assert_eq!(table.rows[0], vec![json!("T3"), json!(2800.0), json!(0.0)]);
    assert_eq!(table.rows[1], vec![json!("T4"), json!(6300.0), json!(3500.0)]);
}

/// Several terminal scalars are merged into one table.
#[tokio::test]
async fn test_multiple_terminals_merge() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "aggregate", "agg_type": "max", "agg_field": "sales"},
            {"id": "T2", "operation": "aggregate", "agg_type": "min", "agg_field": "sales"},
            {"id": "T3", "operation": "aggregate", "agg_type": "count", "agg_field": "sales"}
        ]"#,
    )
    .unwrap();

    let outcome = run_query(tasks, interpreter(), 3).await.unwrap();
    let response = outcome.respond("sales range", &Aggregator::default());
    let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();

    assert_eq!(json["result"]["type"], "table");
    assert_eq!(json["result"]["shape"]["rows"], 3);
    assert_eq!(json["result"]["data"][0], json!({"task": "T1", "value": 2100.0}));
    assert_eq!(json["result"]["data"][2], json!({"task": "T3", "value": 10.0}));
    assert_eq!(
        json["execution_metadata"]["task_execution_times"]
            .as_object()
            .unwrap()
            .len(),
        3
    );
}

/// A bad column fails its task; the dependent is skipped and the
/// independent branch still runs.
#[tokio::test]
async fn test_task_failure_reported() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "filter",
             "conditions": [{"field": "profit", "operator": ">", "value": 0}]},
            {"id": "T2", "operation": "aggregate", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T1"]},
            {"id": "T3", "operation": "aggregate", "agg_type": "sum", "agg_field": "sales"}
        ]"#,
    )
    .unwrap();

    let outcome = run_query(tasks, interpreter(), 2).await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(
        outcome.trace.get(&"T2".into()).unwrap().status,
        TaskStatus::Skipped { cause: "T1".into() }
    );
    assert!(outcome.trace.get(&"T3".into()).unwrap().status.is_done());

    let response = outcome.respond("profit", &Aggregator::default());
    assert_eq!(response.status, ResponseStatus::Failed);
    let failed: Vec<&str> = response.failed_tasks.iter().map(|t| t.as_str()).collect();
    assert_eq!(failed, vec!["T1", "T2"]);
    // Only T3 produced output.
    assert!(matches!(response.result, FormattedResult::Scalar { value, .. } if value == 6300.0 + 2800.0));
}

#[tokio::test]
async fn test_invalid_parameters_abort_before_execution() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "aggregate", "agg_type": "sum", "agg_field": "sales"},
            {"id": "T2", "operation": "compare", "agg_type": "sum",
             "agg_field": "sales", "depends_on": ["T1"]}
        ]"#,
    )
    .unwrap();

    let err = run_query(tasks, interpreter(), 2).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameters { ref task_id, .. } if task_id.as_str() == "T2"));
}

#[tokio::test]
async fn test_duplicate_ids_abort_before_execution() {
    let tasks = parse_tasks(
        r#"[
            {"id": "T1", "operation": "fetch"},
            {"id": "T1", "operation": "fetch"}
        ]"#,
    )
    .unwrap();

    let err = run_query(tasks, interpreter(), 2).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateTask(ref id) if id.as_str() == "T1"));
}
