//! Catalog of named primitive operations; each mutates planning state
//! deterministically (spec.md §4.D).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::planning_state::{Complexity, JoinEdge, Mode, PlanningState};
use crate::report_spec::{ColumnRef, FilterOp, FilterValue};
use crate::schema_graph::SchemaGraph;
use crate::shape_suggestion::suggest_bridge_tables;
use crate::sql_builder::{self, SqlBuildError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpecError {
    #[error("both raw_sql and base_sql were supplied; only one execution mode may be selected")]
    ConflictingModes,

    #[error("duplicate metric alias '{0}'")]
    DuplicateAlias(String),

    #[error("filter on '{column}' uses operator IN with an empty value list")]
    EmptyInFilter { column: String },

    #[error("group_by item '{0}' is not a qualified table.column reference")]
    UnqualifiedGroupBy(String),

    #[error("column reference '{0}' is not qualified as table.column in auto mode")]
    UnresolvedBareColumn(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum JoinError {
    #[error("table '{table}' is disconnected from the rest of the referenced tables")]
    Disconnected { table: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum PrimitiveError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Sql(#[from] SqlBuildError),
}

type PrimitiveClosure = Arc<dyn Fn(&PlanningState) -> Result<PlanningState, PrimitiveError> + Send + Sync>;

/// A single registered primitive operation.
#[derive(Clone)]
pub struct Primitive(PrimitiveClosure);

impl Primitive {
    pub fn apply(&self, state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
        (self.0)(state)
    }
}

/// Name-to-function table, populated once at construction and never
/// mutated again after planning starts (spec.md §9).
#[derive(Clone)]
pub struct PrimitiveRegistry {
    entries: BTreeMap<String, Primitive>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&PlanningState) -> Result<PlanningState, PrimitiveError> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Primitive(Arc::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.entries.get(name)
    }

    /// The ten primitives required by spec.md §4.D, bound to a schema
    /// graph for the two `FindJoinForest` variants and Shape Suggestion,
    /// and to `max_in_filter_size` (`config::EngineConfig`) for
    /// `AnalyzeComplexity`'s oversized-`IN` threshold.
    pub fn builtin(schema: Arc<SchemaGraph>, max_in_filter_size: u32) -> Self {
        let mut registry = Self::new();

        registry.register("ChooseExecutionMode", choose_execution_mode);
        registry.register("ValidateSpecStructurally", validate_spec_structurally);
        registry.register("InferTablesFromSpec", infer_tables_from_spec);
        registry.register("AnalyzeComplexity", move |state| {
            analyze_complexity(state, max_in_filter_size)
        });

        {
            let schema = schema.clone();
            registry.register("FindJoinForest.StrictFK", move |state| {
                find_join_forest_strict(state, &schema)
            });
        }
        {
            let schema = schema.clone();
            registry.register("FindJoinForest.Heuristic", move |state| {
                find_join_forest_heuristic(state, &schema)
            });
        }

        registry.register("BuildSqlFromPlan", build_sql_from_plan);
        registry.register("ExecutePlannedSql", execute_planned_sql);
        registry.register("PassThroughRawSql", pass_through_raw_sql);
        registry.register("WrapBaseSql", wrap_base_sql);

        registry
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of every primitive `PrimitiveRegistry::builtin` registers, for
/// `agent_dsl::parse_catalog` to validate custom catalogs against before
/// they ever reach the planner.
pub const BUILTIN_PRIMITIVE_NAMES: &[&str] = &[
    "ChooseExecutionMode",
    "ValidateSpecStructurally",
    "InferTablesFromSpec",
    "AnalyzeComplexity",
    "FindJoinForest.StrictFK",
    "FindJoinForest.Heuristic",
    "BuildSqlFromPlan",
    "ExecutePlannedSql",
    "PassThroughRawSql",
    "WrapBaseSql",
];

fn choose_execution_mode(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    if state.spec.raw_sql.is_some() && state.spec.base_sql.is_some() {
        return Err(SpecError::ConflictingModes.into());
    }
    let mode = if state.spec.raw_sql.is_some() {
        Mode::Raw
    } else if state.spec.base_sql.is_some() {
        Mode::Base
    } else {
        Mode::Auto
    };
    Ok(state.clone().with_mode(mode))
}

fn validate_spec_structurally(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    let spec = &state.spec;

    let mut seen_aliases = BTreeSet::new();
    for metric in &spec.metrics {
        if !seen_aliases.insert(metric.alias.clone()) {
            return Err(SpecError::DuplicateAlias(metric.alias.clone()).into());
        }
    }

    for filter in &spec.filters {
        if filter.op == FilterOp::In {
            let is_empty = match &filter.value {
                FilterValue::List(v) => v.is_empty(),
                FilterValue::Single(_) => false,
            };
            if is_empty {
                return Err(SpecError::EmptyInFilter {
                    column: filter.column.clone(),
                }
                .into());
            }
        }
    }

    // Qualified group_by is only load-bearing for table inference in auto
    // mode; base/raw mode subqueries may legitimately expose bare columns.
    if state.mode == Mode::Auto {
        for gb in &spec.group_by {
            if ColumnRef::parse(gb).is_none() {
                return Err(SpecError::UnqualifiedGroupBy(gb.clone()).into());
            }
        }
    }

    let mut diagnostics = state.diagnostics.clone();
    diagnostics.push(format!(
        "validated spec: {} metric(s), {} filter(s)",
        spec.metrics.len(),
        spec.filters.len()
    ));
    let mut next = state.clone();
    next.diagnostics = diagnostics;
    Ok(next)
}

fn infer_tables_from_spec(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    if state.mode == Mode::Auto {
        for gb in &state.spec.group_by {
            if ColumnRef::parse(gb).is_none() {
                return Err(SpecError::UnresolvedBareColumn(gb.clone()).into());
            }
        }
        for filter in &state.spec.filters {
            if ColumnRef::parse(&filter.column).is_none() {
                return Err(SpecError::UnresolvedBareColumn(filter.column.clone()).into());
            }
        }
    }

    let tables: BTreeSet<String> = state
        .spec
        .referenced_columns()
        .into_iter()
        .map(|cr| cr.table)
        .collect();

    Ok(state.clone().with_inferred_tables(tables))
}

fn analyze_complexity(
    state: &PlanningState,
    max_in_filter_size: u32,
) -> Result<PlanningState, PrimitiveError> {
    let table_count = state.inferred_tables.len();
    let has_in_or_like = state
        .spec
        .filters
        .iter()
        .any(|f| matches!(f.op, FilterOp::In | FilterOp::Like));
    let has_oversized_in = state.spec.filters.iter().any(|f| {
        f.op == FilterOp::In
            && matches!(&f.value, FilterValue::List(v) if v.len() > max_in_filter_size as usize)
    });
    let has_like = state.spec.filters.iter().any(|f| f.op == FilterOp::Like);

    let complexity = if table_count <= 1 {
        Complexity::Trivial
    } else if table_count <= 3 && !has_in_or_like {
        Complexity::Simple
    } else if has_oversized_in || has_like {
        Complexity::Complex
    } else {
        Complexity::Standard
    };

    Ok(state.clone().with_complexity(complexity))
}

/// Build a deterministic spanning forest over `table_set`, using only
/// edges whose endpoints are both within `table_set` (the induced
/// subgraph). `root` anchors both the traversal and, later, the SQL
/// builder's FROM clause, so it must be supplied rather than recomputed
/// from a possibly-different candidate set.
fn build_spanning_forest(
    schema: &SchemaGraph,
    table_set: &BTreeSet<String>,
    root: &str,
) -> Result<Vec<JoinEdge>, String> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    visited.insert(root.to_string());
    let mut queue: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    queue.push_back(root.to_string());
    let mut forest = Vec::new();

    while let Some(current) = queue.pop_front() {
        for edge in schema.edges_incident(&current) {
            if !table_set.contains(&edge.child_table) || !table_set.contains(&edge.parent_table) {
                continue;
            }
            let Some(other) = edge.other_table(&current) else {
                continue;
            };
            if visited.contains(other) {
                continue;
            }
            visited.insert(other.to_string());
            forest.push(JoinEdge {
                left_table: edge.child_table.clone(),
                left_col: edge.child_column.clone(),
                right_table: edge.parent_table.clone(),
                right_col: edge.parent_column.clone(),
            });
            queue.push_back(other.to_string());
        }
    }

    if visited.len() < table_set.len() {
        let missing = table_set
            .iter()
            .find(|t| !visited.contains(*t))
            .cloned()
            .unwrap_or_default();
        return Err(missing);
    }

    Ok(forest)
}

fn find_join_forest_strict(
    state: &PlanningState,
    schema: &SchemaGraph,
) -> Result<PlanningState, PrimitiveError> {
    if state.inferred_tables.is_empty() {
        return Ok(state.clone().with_join_forest(Vec::new()));
    }
    let root = state.inferred_tables.iter().min().cloned().unwrap();
    match build_spanning_forest(schema, &state.inferred_tables, &root) {
        Ok(forest) => Ok(state.clone().with_join_forest(forest)),
        Err(table) => Err(JoinError::Disconnected { table }.into()),
    }
}

fn find_join_forest_heuristic(
    state: &PlanningState,
    schema: &SchemaGraph,
) -> Result<PlanningState, PrimitiveError> {
    if state.inferred_tables.is_empty() {
        return Ok(state.clone().with_join_forest(Vec::new()));
    }
    let root = state.inferred_tables.iter().min().cloned().unwrap();

    match build_spanning_forest(schema, &state.inferred_tables, &root) {
        Ok(forest) => Ok(state.clone().with_join_forest(forest)),
        Err(_) => {
            let bridges = suggest_bridge_tables(schema, &state.inferred_tables);
            let mut extended = state.inferred_tables.clone();
            extended.extend(bridges);
            match build_spanning_forest(schema, &extended, &root) {
                Ok(forest) => Ok(state.clone().with_join_forest(forest)),
                Err(table) => Err(JoinError::Disconnected { table }.into()),
            }
        }
    }
}

fn build_sql_from_plan(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    let (sql, bound_values) = sql_builder::build_auto_sql(state)?;
    Ok(state.clone().with_sql(sql, bound_values))
}

fn execute_planned_sql(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    // No-op for the core: marks state ready. Actual execution happens in
    // the facade, outside the planner (spec.md §4.D).
    Ok(state.clone())
}

fn pass_through_raw_sql(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    let sql = state.spec.raw_sql.clone().unwrap_or_default();
    Ok(state.clone().with_sql(sql, Vec::new()))
}

fn wrap_base_sql(state: &PlanningState) -> Result<PlanningState, PrimitiveError> {
    let (sql, bound_values) = sql_builder::build_base_sql(state)?;
    Ok(state.clone().with_sql(sql, bound_values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning_state::Mode;
    use crate::report_spec::{Filter, Metric, ReportSpec};
    use crate::schema_graph::{FkEdge, TableMetadata};

    fn sample_schema() -> Arc<SchemaGraph> {
        Arc::new(
            SchemaGraph::build(
                vec![
                    TableMetadata::new("customers", ["id".into(), "region".into()]),
                    TableMetadata::new(
                        "orders",
                        ["id".into(), "customer_id".into(), "amount_cents".into(), "status".into()],
                    ),
                    TableMetadata::new("products", ["id".into()]),
                ],
                vec![FkEdge::new("orders", "customer_id", "customers", "id")],
            )
            .unwrap(),
        )
    }

    #[test]
    fn choose_execution_mode_rejects_conflicting_modes() {
        let spec = ReportSpec {
            raw_sql: Some("SELECT 1".to_string()),
            base_sql: Some("SELECT 1".to_string()),
            ..Default::default()
        };
        let state = PlanningState::new(spec);
        let result = choose_execution_mode(&state);
        assert!(matches!(
            result,
            Err(PrimitiveError::Spec(SpecError::ConflictingModes))
        ));
    }

    #[test]
    fn validate_rejects_duplicate_alias() {
        let spec = ReportSpec {
            metrics: vec![Metric::new("COUNT(*)", "n"), Metric::new("SUM(x.y)", "n")],
            ..Default::default()
        };
        let state = PlanningState::new(spec);
        assert!(matches!(
            validate_spec_structurally(&state),
            Err(PrimitiveError::Spec(SpecError::DuplicateAlias(_)))
        ));
    }

    #[test]
    fn validate_rejects_empty_in_filter() {
        let spec = ReportSpec {
            filters: vec![Filter::new("orders.status", FilterOp::In, FilterValue::List(vec![]))],
            ..Default::default()
        };
        let state = PlanningState::new(spec);
        assert!(matches!(
            validate_spec_structurally(&state),
            Err(PrimitiveError::Spec(SpecError::EmptyInFilter { .. }))
        ));
    }

    #[test]
    fn infer_tables_unions_all_references() {
        let spec = ReportSpec {
            metrics: vec![Metric::new("SUM(orders.amount_cents)", "revenue")],
            group_by: vec!["customers.region".to_string()],
            ..Default::default()
        };
        let state = PlanningState::new(spec).with_mode(Mode::Auto);
        let next = infer_tables_from_spec(&state).unwrap();
        assert_eq!(
            next.inferred_tables,
            ["customers".to_string(), "orders".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn infer_tables_rejects_bare_column_in_auto_mode() {
        let spec = ReportSpec {
            group_by: vec!["region".to_string()],
            ..Default::default()
        };
        let state = PlanningState::new(spec).with_mode(Mode::Auto);
        assert!(matches!(
            infer_tables_from_spec(&state),
            Err(PrimitiveError::Spec(SpecError::UnresolvedBareColumn(_)))
        ));
    }

    #[test]
    fn analyze_complexity_honors_configured_in_filter_threshold() {
        let spec = ReportSpec {
            metrics: vec![Metric::new("COUNT(*)", "n")],
            filters: vec![Filter::new(
                "orders.status",
                FilterOp::In,
                FilterValue::List(vec![serde_json::json!("a"), serde_json::json!("b"), serde_json::json!("c")]),
            )],
            ..Default::default()
        };
        let state = PlanningState::new(spec).with_inferred_tables(
            ["orders".to_string(), "customers".to_string()].into_iter().collect(),
        );

        let lenient = analyze_complexity(&state, 32).unwrap();
        assert_eq!(lenient.complexity, Complexity::Standard);

        let strict = analyze_complexity(&state, 2).unwrap();
        assert_eq!(strict.complexity, Complexity::Complex);
    }

    #[test]
    fn strict_fk_finds_direct_join() {
        let schema = sample_schema();
        let state = PlanningState::new(ReportSpec::new())
            .with_inferred_tables(["customers".to_string(), "orders".to_string()].into_iter().collect());
        let next = find_join_forest_strict(&state, &schema).unwrap();
        assert_eq!(next.join_forest.len(), 1);
        assert_eq!(next.join_forest[0].left_table, "orders");
        assert_eq!(next.join_forest[0].right_table, "customers");
    }

    #[test]
    fn strict_fk_fails_on_disconnected_table() {
        let schema = sample_schema();
        let state = PlanningState::new(ReportSpec::new()).with_inferred_tables(
            ["customers".to_string(), "products".to_string()].into_iter().collect(),
        );
        let result = find_join_forest_strict(&state, &schema);
        assert!(matches!(
            result,
            Err(PrimitiveError::Join(JoinError::Disconnected { .. }))
        ));
    }
}
