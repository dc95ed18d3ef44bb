//! Converts a finalized planning state (tables, join edges, metrics,
//! filters, limit, group-by) into a SQL string (spec.md §4.I).

use std::collections::BTreeSet;

use thiserror::Error;

use crate::planning_state::{BoundValue, JoinEdge, PlanningState};
use crate::report_spec::{ColumnRef, Filter, FilterOp, FilterValue};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlBuildError {
    #[error("no tables to select from")]
    NoTables,

    #[error("filter column '{0}' is not a qualified table.column reference")]
    UnqualifiedFilterColumn(String),

    #[error("group_by item '{0}' is not a qualified table.column reference")]
    UnqualifiedGroupBy(String),
}

/// Emit a single `SELECT` statement in `auto` mode, per spec.md §4.I
/// steps 1-5. Returns the SQL string and a parallel ordered list of bound
/// filter values — literal inlining is forbidden (spec.md §8 property 4).
pub fn build_auto_sql(state: &PlanningState) -> Result<(String, Vec<BoundValue>), SqlBuildError> {
    let spec = &state.spec;

    let root_table = state
        .inferred_tables
        .iter()
        .min()
        .cloned()
        .ok_or(SqlBuildError::NoTables)?;

    let mut select_items = Vec::new();
    for gb in &spec.group_by {
        let cr = ColumnRef::parse(gb).ok_or_else(|| SqlBuildError::UnqualifiedGroupBy(gb.clone()))?;
        select_items.push(quote_qualified(&cr));
    }
    for metric in &spec.metrics {
        select_items.push(format!("{} AS {}", metric.expression, quote_alias(&metric.alias)));
    }

    let (from_clause, _) = build_from_clause(&root_table, &state.join_forest);

    let (where_clause, bound_values) = build_where_clause(&spec.filters)?;

    let group_by_clause = if spec.group_by.is_empty() {
        None
    } else {
        let mut rendered = Vec::new();
        for gb in &spec.group_by {
            let cr =
                ColumnRef::parse(gb).ok_or_else(|| SqlBuildError::UnqualifiedGroupBy(gb.clone()))?;
            rendered.push(quote_qualified(&cr));
        }
        Some(rendered.join(", "))
    };

    let mut sql = format!("SELECT {} FROM {}", select_items.join(", "), from_clause);
    if let Some(where_clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    if let Some(group_by_clause) = group_by_clause {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by_clause);
    }
    if let Some(limit) = spec.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok((sql, bound_values))
}

/// Wrap a `base_sql` subquery per spec.md §4.D `WrapBaseSql`.
pub fn build_base_sql(state: &PlanningState) -> Result<(String, Vec<BoundValue>), SqlBuildError> {
    let spec = &state.spec;
    let base_sql = spec.base_sql.as_deref().unwrap_or_default();

    let mut select_items = Vec::new();
    for gb in &spec.group_by {
        select_items.push(quote_bare(gb));
    }
    for metric in &spec.metrics {
        select_items.push(format!("{} AS {}", metric.expression, quote_alias(&metric.alias)));
    }

    let (where_clause, bound_values) = build_base_where_clause(&spec.filters)?;

    let mut sql = format!(
        "SELECT {} FROM ({}) __base__",
        select_items.join(", "),
        base_sql
    );
    if let Some(where_clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    if !spec.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(
            &spec
                .group_by
                .iter()
                .map(|gb| quote_bare(gb))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }
    if let Some(limit) = spec.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok((sql, bound_values))
}

/// Walk the join forest in planning order, introducing each new table
/// exactly once (spec.md §4.I step 2). Returns the FROM/JOIN clause text
/// and the set of tables it touches (for the table-closure property).
fn build_from_clause(root_table: &str, join_forest: &[JoinEdge]) -> (String, BTreeSet<String>) {
    let mut touched: BTreeSet<String> = BTreeSet::new();
    touched.insert(root_table.to_string());
    let mut clause = format!("{}", quote_ident(root_table));

    for edge in join_forest {
        let (new_table, join_left_table, join_left_col, join_right_table, join_right_col) =
            if touched.contains(&edge.left_table) && !touched.contains(&edge.right_table) {
                (
                    edge.right_table.clone(),
                    &edge.left_table,
                    &edge.left_col,
                    &edge.right_table,
                    &edge.right_col,
                )
            } else if touched.contains(&edge.right_table) && !touched.contains(&edge.left_table) {
                (
                    edge.left_table.clone(),
                    &edge.left_table,
                    &edge.left_col,
                    &edge.right_table,
                    &edge.right_col,
                )
            } else {
                // Both endpoints already present (or neither, which the
                // planner's ordering guarantees doesn't happen) — elide.
                continue;
            };

        clause.push_str(&format!(
            " INNER JOIN {} ON {}.{} = {}.{}",
            quote_ident(&new_table),
            quote_ident(join_left_table),
            quote_ident(join_left_col),
            quote_ident(join_right_table),
            quote_ident(join_right_col),
        ));
        touched.insert(new_table);
    }

    (clause, touched)
}

fn build_where_clause(filters: &[Filter]) -> Result<(Option<String>, Vec<BoundValue>), SqlBuildError> {
    if filters.is_empty() {
        return Ok((None, Vec::new()));
    }
    let mut clauses = Vec::new();
    let mut bound_values = Vec::new();
    for filter in filters {
        let cr = ColumnRef::parse(&filter.column)
            .ok_or_else(|| SqlBuildError::UnqualifiedFilterColumn(filter.column.clone()))?;
        let column = quote_qualified(&cr);
        match filter.op {
            FilterOp::In => {
                let values = match &filter.value {
                    FilterValue::List(v) => v.clone(),
                    FilterValue::Single(v) => vec![v.clone()],
                };
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", column, placeholders));
                bound_values.extend(values);
            }
            FilterOp::Like => {
                clauses.push(format!("{} LIKE ?", column));
                bound_values.push(single_value(&filter.value));
            }
            _ => {
                clauses.push(format!("{} {} ?", column, filter.op.as_str()));
                bound_values.push(single_value(&filter.value));
            }
        }
    }
    Ok((Some(clauses.join(" AND ")), bound_values))
}

/// Like `build_where_clause`, but for base-mode SQL: filter columns are
/// not required to be table-qualified, since the base subquery has
/// already flattened the column namespace.
fn build_base_where_clause(filters: &[Filter]) -> Result<(Option<String>, Vec<BoundValue>), SqlBuildError> {
    if filters.is_empty() {
        return Ok((None, Vec::new()));
    }
    let mut clauses = Vec::new();
    let mut bound_values = Vec::new();
    for filter in filters {
        let column = quote_bare(&filter.column);
        match filter.op {
            FilterOp::In => {
                let values = match &filter.value {
                    FilterValue::List(v) => v.clone(),
                    FilterValue::Single(v) => vec![v.clone()],
                };
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", column, placeholders));
                bound_values.extend(values);
            }
            FilterOp::Like => {
                clauses.push(format!("{} LIKE ?", column));
                bound_values.push(single_value(&filter.value));
            }
            _ => {
                clauses.push(format!("{} {} ?", column, filter.op.as_str()));
                bound_values.push(single_value(&filter.value));
            }
        }
    }
    Ok((Some(clauses.join(" AND ")), bound_values))
}

fn single_value(value: &FilterValue) -> BoundValue {
    match value {
        FilterValue::Single(v) => v.clone(),
        FilterValue::List(v) => v.first().cloned().unwrap_or(serde_json::Value::Null),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn quote_qualified(cr: &ColumnRef) -> String {
    format!("{}.{}", quote_ident(&cr.table), quote_ident(&cr.column))
}

/// Render a `table.column` or bare identifier for base-mode SQL, where the
/// subquery alias has already flattened table qualification away. Strips
/// any qualification and quotes the bare column name.
fn quote_bare(s: &str) -> String {
    let bare = match s.rsplit_once('.') {
        Some((_, column)) => column,
        None => s,
    };
    quote_ident(bare)
}

fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn quote_alias(alias: &str) -> String {
    if is_valid_identifier(alias) {
        alias.to_string()
    } else {
        quote_ident(alias)
    }
}
