//! The decomposition engine: given a root task, a method registry, and a
//! state, produces a trace of primitive applications (spec.md §4.C).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::htn::primitives::{PrimitiveError, PrimitiveRegistry};
use crate::planning_state::{PlanningState, StateKey, StateValue};

/// A named work unit: either decomposed further (`Compound`) or applied
/// directly (`Primitive`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Compound(String),
    Primitive(String),
}

impl Task {
    pub fn compound(name: impl Into<String>) -> Self {
        Task::Compound(name.into())
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Task::Primitive(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Compound(n) | Task::Primitive(n) => n,
        }
    }
}

/// A single guard predicate over planning state. The closed sum type from
/// spec.md §9 ("avoid stringly-typed evaluation"); a `Guard` is a
/// conjunction of these (spec.md §4.C step 3).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(StateKey, StateValue),
    NotEquals(StateKey, StateValue),
    SizeLte(StateKey, i64),
    SizeGte(StateKey, i64),
    /// Substring match for `StateValue::Str`; falls back to equality for
    /// non-string state (sizes/bools have no meaningful "contains").
    Contains(StateKey, StateValue),
    IsSet(StateKey),
    IsUnset(StateKey),
    In(StateKey, Vec<StateValue>),
}

impl Predicate {
    fn evaluate(&self, state: &PlanningState) -> bool {
        match self {
            Predicate::Equals(key, expected) => state.get(*key) == *expected,
            Predicate::NotEquals(key, expected) => state.get(*key) != *expected,
            Predicate::SizeLte(key, bound) => as_int(state.get(*key)) <= *bound,
            Predicate::SizeGte(key, bound) => as_int(state.get(*key)) >= *bound,
            Predicate::Contains(key, needle) => match (state.get(*key), needle) {
                (StateValue::Str(s), StateValue::Str(n)) => s.contains(n.as_str()),
                (value, needle) => value == *needle,
            },
            Predicate::IsSet(key) => as_bool(state.get(*key)),
            Predicate::IsUnset(key) => !as_bool(state.get(*key)),
            Predicate::In(key, options) => {
                let value = state.get(*key);
                options.iter().any(|o| *o == value)
            }
        }
    }
}

fn as_int(value: StateValue) -> i64 {
    match value {
        StateValue::Int(i) => i,
        StateValue::Bool(b) => i64::from(b),
        StateValue::Str(_) => 0,
    }
}

fn as_bool(value: StateValue) -> bool {
    match value {
        StateValue::Bool(b) => b,
        StateValue::Int(i) => i != 0,
        StateValue::Str(s) => !s.is_empty(),
    }
}

/// A conjunction of predicates; an empty guard always passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guard(pub Vec<Predicate>);

impl Guard {
    pub fn always() -> Self {
        Guard(Vec::new())
    }

    pub fn all(predicates: Vec<Predicate>) -> Self {
        Guard(predicates)
    }

    fn passes(&self, state: &PlanningState) -> bool {
        self.0.iter().all(|p| p.evaluate(state))
    }
}

/// A named decomposition rule bound to a compound task (spec.md §3/§4.C).
/// Methods for the same task are tried in registration order; the first
/// passing guard wins.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub guard: Guard,
    pub steps: Vec<Task>,
}

impl Method {
    pub fn new(name: impl Into<String>, guard: Guard, steps: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            guard,
            steps,
        }
    }
}

/// Method catalog: task name -> methods, tried in registration order.
/// Insertion-ordered (`Vec`, not a hash map) to satisfy the determinism
/// requirement of spec.md §4.C.
#[derive(Debug, Clone, Default)]
pub struct MethodCatalog(BTreeMap<String, Vec<Method>>);

impl MethodCatalog {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn add_method(&mut self, task: impl Into<String>, method: Method) {
        self.0.entry(task.into()).or_default().push(method);
    }

    pub fn methods_for(&self, task: &str) -> Option<&[Method]> {
        self.0.get(task).map(Vec::as_slice)
    }
}

/// `(task_name, method_name_or_null, depth, state_keys_changed)`, appended
/// each time a method fires or a primitive applies (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub task_name: String,
    pub method_name: Option<String>,
    pub depth: usize,
    pub state_keys_changed: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlannerError {
    #[error("no applicable method for task '{0}'")]
    NoApplicableMethod(String),

    #[error("primitive '{0}' not found in registry")]
    UnknownPrimitive(String),

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),

    #[error("planning cancelled")]
    Cancelled,
}

/// Caller-provided cooperative cancellation signal, checked between
/// primitive applications (spec.md §5).
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

struct Frame {
    task: Task,
    depth: usize,
}

/// Run the depth-first, deterministic decomposition algorithm of
/// spec.md §4.C steps 1-6.
pub fn plan(
    root_task: Task,
    initial_state: PlanningState,
    methods: &MethodCatalog,
    primitives: &PrimitiveRegistry,
    cancellation: Option<&dyn CancellationToken>,
) -> Result<(PlanningState, Vec<TraceStep>), PlannerError> {
    let mut state = initial_state;
    let mut trace = Vec::new();
    let mut stack: Vec<Frame> = vec![Frame {
        task: root_task,
        depth: 0,
    }];

    while let Some(Frame { task, depth }) = stack.pop() {
        if let Some(token) = cancellation {
            if token.is_cancelled() {
                return Err(PlannerError::Cancelled);
            }
        }

        match task {
            Task::Primitive(name) => {
                let op = primitives
                    .get(&name)
                    .ok_or_else(|| PlannerError::UnknownPrimitive(name.clone()))?;
                let before = state.clone();
                state = op.apply(&state)?;
                trace.push(TraceStep {
                    task_name: name,
                    method_name: None,
                    depth,
                    state_keys_changed: changed_keys(&before, &state),
                });
            }
            Task::Compound(name) => {
                let candidates = methods
                    .methods_for(&name)
                    .ok_or_else(|| PlannerError::NoApplicableMethod(name.clone()))?;
                let chosen = candidates
                    .iter()
                    .find(|m| m.guard.passes(&state))
                    .ok_or_else(|| PlannerError::NoApplicableMethod(name.clone()))?;

                trace.push(TraceStep {
                    task_name: name,
                    method_name: Some(chosen.name.clone()),
                    depth,
                    state_keys_changed: Vec::new(),
                });

                for step in chosen.steps.iter().rev() {
                    stack.push(Frame {
                        task: step.clone(),
                        depth: depth + 1,
                    });
                }
            }
        }
    }

    Ok((state, trace))
}

/// Coarse pre/post diff used for trace completeness (spec.md §8 property 6).
fn changed_keys(before: &PlanningState, after: &PlanningState) -> Vec<String> {
    let mut changed = Vec::new();
    if before.mode != after.mode {
        changed.push("mode".to_string());
    }
    if before.inferred_tables != after.inferred_tables {
        changed.push("inferred_tables".to_string());
    }
    if (before.complexity as u8) != (after.complexity as u8) {
        changed.push("complexity".to_string());
    }
    if before.join_forest != after.join_forest {
        changed.push("join_forest".to_string());
    }
    if before.sql != after.sql {
        changed.push("sql".to_string());
    }
    if before.diagnostics.len() != after.diagnostics.len() {
        changed.push("diagnostics".to_string());
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_spec::ReportSpec;

    #[test]
    fn plan_applies_single_primitive() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("noop", |state| {
            Ok(state.clone().with_diagnostic("ran"))
        });
        let mut methods = MethodCatalog::new();
        methods.add_method(
            "Root",
            Method::new("OnlyWay", Guard::always(), vec![Task::primitive("noop")]),
        );
        let (final_state, trace) = plan(
            Task::compound("Root"),
            PlanningState::new(ReportSpec::new()),
            &methods,
            &registry,
            None,
        )
        .unwrap();
        assert_eq!(final_state.diagnostics, vec!["ran".to_string()]);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].task_name, "Root");
        assert_eq!(trace[1].task_name, "noop");
    }

    #[test]
    fn contains_matches_substrings_unlike_equals() {
        let state = PlanningState::new(ReportSpec::new()).with_mode(crate::planning_state::Mode::Auto);
        let contains = Predicate::Contains(StateKey::Mode, StateValue::Str("ut".to_string()));
        let equals = Predicate::Equals(StateKey::Mode, StateValue::Str("ut".to_string()));
        assert!(contains.evaluate(&state));
        assert!(!equals.evaluate(&state));
    }

    #[test]
    fn plan_fails_without_applicable_method() {
        let registry = PrimitiveRegistry::new();
        let methods = MethodCatalog::new();
        let result = plan(
            Task::compound("Missing"),
            PlanningState::new(ReportSpec::new()),
            &methods,
            &registry,
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            PlannerError::NoApplicableMethod("Missing".to_string())
        );
    }

    #[test]
    fn plan_picks_first_passing_guard_in_registration_order() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("markA", |s| Ok(s.clone().with_diagnostic("A")));
        registry.register("markB", |s| Ok(s.clone().with_diagnostic("B")));
        let mut methods = MethodCatalog::new();
        methods.add_method(
            "Root",
            Method::new(
                "NeverMatches",
                Guard::all(vec![Predicate::IsSet(StateKey::HasRawSql)]),
                vec![Task::primitive("markA")],
            ),
        );
        methods.add_method(
            "Root",
            Method::new("Fallback", Guard::always(), vec![Task::primitive("markB")]),
        );
        let (final_state, _) = plan(
            Task::compound("Root"),
            PlanningState::new(ReportSpec::new()),
            &methods,
            &registry,
            None,
        )
        .unwrap();
        assert_eq!(final_state.diagnostics, vec!["B".to_string()]);
    }
}
