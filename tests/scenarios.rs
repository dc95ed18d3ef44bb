//! End-to-end scenario tests driving `QueryEngine` the way a caller
//! would, exercising the full `AnswerReport` decomposition.

use std::sync::Arc;

use htnql::facade::{FacadeError, NullExecutor, QueryEngine};
use htnql::htn::kernel::PlannerError;
use htnql::htn::primitives::{JoinError, PrimitiveError, SpecError};
use htnql::report_spec::{Filter, FilterOp, FilterValue, Metric, ReportSpec};
use htnql::schema_graph::{FkEdge, SchemaGraph, TableMetadata};

fn illustrative_schema() -> Arc<SchemaGraph> {
    Arc::new(
        SchemaGraph::build(
            vec![
                TableMetadata::new("customers", ["id".into(), "region".into()]),
                TableMetadata::new(
                    "orders",
                    [
                        "id".into(),
                        "customer_id".into(),
                        "amount_cents".into(),
                        "status".into(),
                    ],
                ),
                TableMetadata::new("products", ["id".into(), "name".into()]),
            ],
            vec![FkEdge::new("orders", "customer_id", "customers", "id")],
        )
        .unwrap(),
    )
}

fn engine() -> QueryEngine {
    QueryEngine::new(illustrative_schema(), Arc::new(NullExecutor), 32)
}

#[tokio::test]
async fn s1_trivial_single_table() {
    let spec = ReportSpec {
        metrics: vec![Metric::new("COUNT(*)", "n")],
        group_by: vec!["orders.status".to_string()],
        ..Default::default()
    };
    let (result, _trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert_eq!(
        result.sql,
        r#"SELECT "orders"."status", COUNT(*) AS n FROM "orders" GROUP BY "orders"."status""#
    );
    assert!(result.bound_values.is_empty());
}

#[tokio::test]
async fn s2_cross_table_join() {
    let spec = ReportSpec {
        metrics: vec![Metric::new("SUM(orders.amount_cents)", "revenue")],
        group_by: vec!["customers.region".to_string()],
        ..Default::default()
    };
    let (result, _trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert!(result.sql.contains(
        r#"FROM "customers" INNER JOIN "orders" ON "orders"."customer_id" = "customers"."id""#
    ));
    assert!(result.sql.contains(r#"GROUP BY "customers"."region""#));
}

#[tokio::test]
async fn s3_in_filter_uses_placeholders() {
    let spec = ReportSpec {
        metrics: vec![Metric::new("SUM(orders.amount_cents)", "revenue")],
        group_by: vec!["customers.region".to_string()],
        filters: vec![Filter::new(
            "orders.status",
            FilterOp::In,
            FilterValue::List(vec![serde_json::json!("paid"), serde_json::json!("shipped")]),
        )],
        ..Default::default()
    };
    let (result, _trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert!(result.sql.contains(r#"WHERE "orders"."status" IN (?, ?)"#));
    assert_eq!(
        result.bound_values,
        vec![serde_json::json!("paid"), serde_json::json!("shipped")]
    );
    assert!(!result.sql.contains("paid"));
    assert!(!result.sql.contains("shipped"));
}

#[tokio::test]
async fn s4_raw_mode_passes_through_untouched() {
    let spec = ReportSpec {
        raw_sql: Some("SELECT 1".to_string()),
        ..Default::default()
    };
    let (result, _trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert_eq!(result.sql, "SELECT 1");
}

#[tokio::test]
async fn s5_base_mode_wraps_subquery() {
    let spec = ReportSpec {
        base_sql: Some(
            "SELECT region, amount_cents FROM orders JOIN customers ON orders.customer_id = customers.id"
                .to_string(),
        ),
        metrics: vec![Metric::new("SUM(amount_cents)", "total")],
        group_by: vec!["region".to_string()],
        ..Default::default()
    };
    let (result, _trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert_eq!(
        result.sql,
        r#"SELECT "region", SUM(amount_cents) AS total FROM (SELECT region, amount_cents FROM orders JOIN customers ON orders.customer_id = customers.id) __base__ GROUP BY "region""#
    );
}

#[tokio::test]
async fn s6_disconnected_tables_report_join_error() {
    let spec = ReportSpec {
        metrics: vec![Metric::new("COUNT(*)", "n")],
        group_by: vec!["customers.region".to_string(), "products.name".to_string()],
        ..Default::default()
    };
    let result = engine().run_report(spec).await;
    match result {
        Err(FacadeError::Planner(PlannerError::Primitive(PrimitiveError::Join(
            JoinError::Disconnected { table },
        )))) => {
            assert!(table == "customers" || table == "products");
        }
        other => panic!("expected JoinError::Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn mode_disjointness_fails_before_any_primitive_runs() {
    let spec = ReportSpec {
        raw_sql: Some("SELECT 1".to_string()),
        base_sql: Some("SELECT 2".to_string()),
        ..Default::default()
    };
    let result = engine().run_report(spec).await;
    assert!(matches!(
        result,
        Err(FacadeError::Planner(PlannerError::Primitive(PrimitiveError::Spec(
            SpecError::ConflictingModes
        ))))
    ));
}

#[tokio::test]
async fn trace_records_every_step_with_depth() {
    let spec = ReportSpec {
        metrics: vec![Metric::new("COUNT(*)", "n")],
        group_by: vec!["orders.status".to_string()],
        ..Default::default()
    };
    let (_result, trace) = engine().run_report_with_trace(spec, None).await.unwrap();
    assert!(trace.iter().any(|t| t.task_name == "AnswerReport" && t.depth == 0));
    assert!(trace.iter().any(|t| t.task_name == "BuildSqlFromPlan"));
    let build_step = trace.iter().find(|t| t.task_name == "BuildSqlFromPlan").unwrap();
    assert!(build_step.state_keys_changed.contains(&"sql".to_string()));
}
