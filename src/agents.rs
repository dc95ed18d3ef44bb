//! The compiled-in `AnswerReport` method catalog — the built-in agent
//! that ships with the engine, expressed directly in Rust rather than
//! through the DSL (spec.md §4.F).

use lazy_static::lazy_static;

use crate::htn::{Guard, Method, MethodCatalog, Predicate, Task};
use crate::planning_state::{Complexity, StateKey, StateValue};

fn mode(s: &str) -> StateValue {
    StateValue::Str(s.to_string())
}

fn complexity(c: Complexity) -> StateValue {
    StateValue::Str(c.as_str().to_string())
}

lazy_static! {
    /// The built-in catalog, compiled once and cloned out to callers —
    /// same shape as `function_registry`'s static mapping tables.
    static ref BUILTIN_CATALOG: MethodCatalog = build_catalog();
}

/// The default catalog: `AnswerReport` picks an execution mode, plans
/// it, then (conceptually) executes the result.
pub fn builtin_catalog() -> MethodCatalog {
    BUILTIN_CATALOG.clone()
}

fn build_catalog() -> MethodCatalog {
    let mut catalog = MethodCatalog::new();

    catalog.add_method(
        "AnswerReport",
        Method::new(
            "Standard",
            Guard::always(),
            vec![
                Task::primitive("ChooseExecutionMode"),
                Task::compound("PlanExecution"),
                Task::primitive("ExecutePlannedSql"),
            ],
        ),
    );

    catalog.add_method(
        "PlanExecution",
        Method::new(
            "RawPath",
            Guard::all(vec![Predicate::Equals(StateKey::Mode, mode("raw"))]),
            vec![Task::primitive("PassThroughRawSql")],
        ),
    );
    catalog.add_method(
        "PlanExecution",
        Method::new(
            "BasePath",
            Guard::all(vec![Predicate::Equals(StateKey::Mode, mode("base"))]),
            vec![
                Task::primitive("ValidateSpecStructurally"),
                Task::primitive("WrapBaseSql"),
            ],
        ),
    );
    catalog.add_method(
        "PlanExecution",
        Method::new(
            "AutoPath",
            Guard::all(vec![Predicate::Equals(StateKey::Mode, mode("auto"))]),
            vec![Task::compound("PlanAutoSql")],
        ),
    );

    catalog.add_method(
        "PlanAutoSql",
        Method::new(
            "Standard",
            Guard::always(),
            vec![
                Task::primitive("ValidateSpecStructurally"),
                Task::primitive("InferTablesFromSpec"),
                Task::primitive("AnalyzeComplexity"),
                Task::compound("FindJoinForest"),
                Task::primitive("BuildSqlFromPlan"),
            ],
        ),
    );

    catalog.add_method(
        "FindJoinForest",
        Method::new(
            "Strict",
            Guard::all(vec![Predicate::In(
                StateKey::Complexity,
                vec![
                    complexity(Complexity::Trivial),
                    complexity(Complexity::Simple),
                    complexity(Complexity::Standard),
                ],
            )]),
            vec![Task::primitive("FindJoinForest.StrictFK")],
        ),
    );
    catalog.add_method(
        "FindJoinForest",
        Method::new(
            "Heuristic",
            Guard::all(vec![Predicate::Equals(
                StateKey::Complexity,
                complexity(Complexity::Complex),
            )]),
            vec![Task::primitive("FindJoinForest.Heuristic")],
        ),
    );

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htn::plan;
    use crate::htn::primitives::PrimitiveRegistry;
    use crate::planning_state::PlanningState;
    use crate::report_spec::{Metric, ReportSpec};
    use crate::schema_graph::{FkEdge, SchemaGraph, TableMetadata};
    use std::sync::Arc;

    fn sample_schema() -> Arc<SchemaGraph> {
        Arc::new(
            SchemaGraph::build(
                vec![
                    TableMetadata::new("customers", ["id".into(), "region".into()]),
                    TableMetadata::new(
                        "orders",
                        ["id".into(), "customer_id".into(), "amount_cents".into(), "status".into()],
                    ),
                ],
                vec![FkEdge::new("orders", "customer_id", "customers", "id")],
            )
            .unwrap(),
        )
    }

    #[test]
    fn answer_report_drives_a_trivial_query_end_to_end() {
        let schema = sample_schema();
        let registry = PrimitiveRegistry::builtin(schema, 32);
        let catalog = builtin_catalog();
        let spec = ReportSpec {
            metrics: vec![Metric::new("COUNT(*)", "n")],
            group_by: vec!["orders.status".to_string()],
            ..Default::default()
        };
        let (final_state, trace) = plan(
            Task::compound("AnswerReport"),
            PlanningState::new(spec),
            &catalog,
            &registry,
            None,
        )
        .unwrap();
        assert_eq!(
            final_state.sql.as_deref(),
            Some(r#"SELECT "orders"."status", COUNT(*) AS n FROM "orders" GROUP BY "orders"."status""#)
        );
        assert!(trace.iter().any(|t| t.task_name == "BuildSqlFromPlan"));
    }
}
