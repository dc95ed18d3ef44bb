//! The caller-facing input: a declarative description of a report.

use serde::{Deserialize, Serialize};

/// A fully-qualified `table.column` reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse a `table.column` string. Returns `None` for bare column names
    /// (no dot) — those are left unresolved per spec — and for anything
    /// whose pre-dot segment isn't a plausible identifier (e.g. the `1.05`
    /// in a numeric literal scanned out of a metric expression).
    pub fn parse(s: &str) -> Option<Self> {
        let (table, column) = s.split_once('.')?;
        if table.is_empty() || column.is_empty() || !looks_like_identifier(table) {
            return None;
        }
        Some(Self::new(table, column))
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// One `(expression, alias)` aggregate entry in the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub expression: String,
    pub alias: String,
}

impl Metric {
    pub fn new(expression: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            alias: alias.into(),
        }
    }
}

/// Filter comparison operator, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    In,
    Like,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Gt => ">",
            FilterOp::Le => "<=",
            FilterOp::Ge => ">=",
            FilterOp::In => "IN",
            FilterOp::Like => "LIKE",
        }
    }
}

/// A bound filter value. `In` filters carry a list; all others carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(serde_json::Value),
    List(Vec<serde_json::Value>),
}

/// One `(column, op, value)` filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

/// The declarative report description submitted to the facade.
///
/// At most one of `raw_sql`/`base_sql` may be set; both set is a
/// `SpecError` (mode disjointness, spec.md §8 property 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub raw_sql: Option<String>,
    #[serde(default)]
    pub base_sql: Option<String>,
}

impl ReportSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `table.column` occurrence across metrics, group_by, and filters.
    /// Metric expressions are scanned token-by-token for `table.column`
    /// shapes (e.g. `SUM(orders.amount_cents)`); bare identifiers and SQL
    /// keywords are ignored.
    pub fn referenced_columns(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        for metric in &self.metrics {
            out.extend(scan_column_refs(&metric.expression));
        }
        for gb in &self.group_by {
            if let Some(cr) = ColumnRef::parse(gb) {
                out.push(cr);
            }
        }
        for filter in &self.filters {
            if let Some(cr) = ColumnRef::parse(&filter.column) {
                out.push(cr);
            }
        }
        out
    }
}

/// Mirrors `sql_builder::is_valid_identifier`'s leading-character rule, just
/// enough to reject numeric-literal segments like the `1` in `1.05`.
fn looks_like_identifier(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Pull `identifier.identifier` tokens out of an arbitrary SQL expression
/// fragment (used for metric expressions like `SUM(orders.amount_cents)`).
fn scan_column_refs(expr: &str) -> Vec<ColumnRef> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut tokens: Vec<String> = Vec::new();
    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };
    for ch in expr.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '.' {
            current.push(ch);
        } else {
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);
    for tok in tokens {
        if let Some(cr) = ColumnRef::parse(&tok) {
            out.push(cr);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_column() {
        assert_eq!(
            ColumnRef::parse("orders.status"),
            Some(ColumnRef::new("orders", "status"))
        );
    }

    #[test]
    fn rejects_bare_column() {
        assert_eq!(ColumnRef::parse("status"), None);
    }

    #[test]
    fn rejects_numeric_literal_segment() {
        assert_eq!(ColumnRef::parse("1.05"), None);
    }

    #[test]
    fn scan_column_refs_ignores_decimal_literals() {
        let refs = scan_column_refs("orders.amount_cents * 1.05");
        assert_eq!(refs, vec![ColumnRef::new("orders", "amount_cents")]);
    }

    #[test]
    fn scans_columns_from_metric_expression() {
        let refs = scan_column_refs("SUM(orders.amount_cents)");
        assert_eq!(refs, vec![ColumnRef::new("orders", "amount_cents")]);
    }

    #[test]
    fn referenced_columns_covers_metrics_group_by_and_filters() {
        let spec = ReportSpec {
            metrics: vec![Metric::new("SUM(orders.amount_cents)", "revenue")],
            group_by: vec!["customers.region".to_string()],
            filters: vec![Filter::new(
                "orders.status",
                FilterOp::Eq,
                FilterValue::Single(serde_json::json!("paid")),
            )],
            ..Default::default()
        };
        let refs = spec.referenced_columns();
        assert!(refs.contains(&ColumnRef::new("orders", "amount_cents")));
        assert!(refs.contains(&ColumnRef::new("customers", "region")));
        assert!(refs.contains(&ColumnRef::new("orders", "status")));
    }
}
