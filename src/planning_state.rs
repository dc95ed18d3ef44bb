//! The planning state threaded through every primitive: an explicit-schema
//! record (spec.md §9 option: "tagged-variant record with explicit schema"),
//! updated only via `with_*` builders that return a new value.

use std::collections::BTreeSet;

use crate::report_spec::ReportSpec;

/// Which execution path the planner is following.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Raw,
    Base,
    Auto,
}

/// A coarse shape tag used only by method guards (spec.md §4.D
/// `AnalyzeComplexity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Trivial,
    Simple,
    Standard,
    Complex,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Trivial => "trivial",
            Complexity::Simple => "simple",
            Complexity::Standard => "standard",
            Complexity::Complex => "complex",
        }
    }
}

/// One join-forest edge as finalized by `FindJoinForest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub left_table: String,
    pub left_col: String,
    pub right_table: String,
    pub right_col: String,
}

/// A value bound to a SQL placeholder, in emission order.
pub type BoundValue = serde_json::Value;

/// Symbolic keys over `PlanningState`, used by the DSL predicate evaluator
/// to look up values without stringly-typed field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Mode,
    Complexity,
    InferredTableCount,
    HasRawSql,
    HasBaseSql,
    HasSql,
    FilterHasIn,
    FilterHasLike,
    MaxInFilterSize,
}

/// A scalar value extracted from state for predicate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// The mapping threaded through primitives. Conceptually immutable between
/// primitives: each one returns a new state (§3), realized here as
/// `Clone` + builder methods that consume and return `self`.
#[derive(Debug, Clone)]
pub struct PlanningState {
    pub spec: ReportSpec,
    pub mode: Mode,
    pub inferred_tables: BTreeSet<String>,
    pub complexity: Complexity,
    pub join_forest: Vec<JoinEdge>,
    pub sql: Option<String>,
    pub bound_values: Vec<BoundValue>,
    pub diagnostics: Vec<String>,
}

impl PlanningState {
    pub fn new(spec: ReportSpec) -> Self {
        Self {
            spec,
            mode: Mode::Auto,
            inferred_tables: BTreeSet::new(),
            complexity: Complexity::Trivial,
            join_forest: Vec::new(),
            sql: None,
            bound_values: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_inferred_tables(mut self, tables: BTreeSet<String>) -> Self {
        self.inferred_tables = tables;
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_join_forest(mut self, forest: Vec<JoinEdge>) -> Self {
        self.join_forest = forest;
        self
    }

    pub fn with_sql(mut self, sql: String, bound_values: Vec<BoundValue>) -> Self {
        self.sql = Some(sql);
        self.bound_values = bound_values;
        self
    }

    pub fn with_diagnostic(mut self, message: impl Into<String>) -> Self {
        self.diagnostics.push(message.into());
        self
    }

    /// Typed accessor for the DSL predicate evaluator.
    pub fn get(&self, key: StateKey) -> StateValue {
        match key {
            StateKey::Mode => StateValue::Str(
                match self.mode {
                    Mode::Raw => "raw",
                    Mode::Base => "base",
                    Mode::Auto => "auto",
                }
                .to_string(),
            ),
            StateKey::Complexity => StateValue::Str(self.complexity.as_str().to_string()),
            StateKey::InferredTableCount => {
                StateValue::Int(self.inferred_tables.len() as i64)
            }
            StateKey::HasRawSql => StateValue::Bool(self.spec.raw_sql.is_some()),
            StateKey::HasBaseSql => StateValue::Bool(self.spec.base_sql.is_some()),
            StateKey::HasSql => StateValue::Bool(self.sql.is_some()),
            StateKey::FilterHasIn => StateValue::Bool(
                self.spec
                    .filters
                    .iter()
                    .any(|f| f.op == crate::report_spec::FilterOp::In),
            ),
            StateKey::FilterHasLike => StateValue::Bool(
                self.spec
                    .filters
                    .iter()
                    .any(|f| f.op == crate::report_spec::FilterOp::Like),
            ),
            StateKey::MaxInFilterSize => {
                let max = self
                    .spec
                    .filters
                    .iter()
                    .filter(|f| f.op == crate::report_spec::FilterOp::In)
                    .map(|f| match &f.value {
                        crate::report_spec::FilterValue::List(v) => v.len(),
                        crate::report_spec::FilterValue::Single(_) => 1,
                    })
                    .max()
                    .unwrap_or(0);
                StateValue::Int(max as i64)
            }
        }
    }
}
