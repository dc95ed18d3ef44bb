//! Declarative method-catalog configuration, deserialized from YAML/JSON
//! (spec.md §4.F "Agent DSL"). A closed predicate sum type keeps guard
//! evaluation out of stringly-typed territory even when catalogs are
//! authored externally.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::htn::{Guard, Method, MethodCatalog, Predicate};
use crate::planning_state::{StateKey, StateValue};

#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("method catalog references unknown primitive '{0}'")]
    UnknownPrimitive(String),

    #[error("unknown state key '{0}' in guard predicate")]
    UnknownStateKey(String),

    #[error("unknown predicate operator '{0}'")]
    UnknownOperator(String),

    #[error("malformed DSL document: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    tasks: BTreeMap<String, Vec<RawMethod>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMethod {
    name: String,
    #[serde(default)]
    when: Vec<RawPredicate>,
    steps: Vec<RawTask>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPredicate {
    field: String,
    op: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    values: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTask {
    Primitive { primitive: String },
    Compound { task: String },
}

/// Parse a DSL document (YAML or JSON, both accepted since `serde_yaml`
/// is a superset-compatible parser) into a `MethodCatalog`.
///
/// Primitive references are resolved eagerly against `known_primitives` —
/// an unknown primitive name fails parsing immediately, before any
/// planning begins (spec.md §4.F). Compound task references are left
/// unresolved here; the planner itself reports `NoApplicableMethod` if a
/// referenced compound task never gets defined.
pub fn parse_catalog(source: &str, known_primitives: &[&str]) -> Result<MethodCatalog, AgentError> {
    let raw: RawCatalog =
        serde_yaml::from_str(source).map_err(|e| AgentError::Parse(e.to_string()))?;

    let mut catalog = MethodCatalog::new();
    for (task_name, methods) in raw.tasks {
        for raw_method in methods {
            let guard = parse_guard(&raw_method.when)?;
            let mut steps = Vec::with_capacity(raw_method.steps.len());
            for raw_task in raw_method.steps {
                steps.push(match raw_task {
                    RawTask::Primitive { primitive } => {
                        if !known_primitives.contains(&primitive.as_str()) {
                            return Err(AgentError::UnknownPrimitive(primitive));
                        }
                        crate::htn::Task::primitive(primitive)
                    }
                    RawTask::Compound { task } => crate::htn::Task::compound(task),
                });
            }
            catalog.add_method(task_name.clone(), Method::new(raw_method.name, guard, steps));
        }
    }
    Ok(catalog)
}

fn parse_guard(predicates: &[RawPredicate]) -> Result<Guard, AgentError> {
    let mut out = Vec::with_capacity(predicates.len());
    for p in predicates {
        out.push(parse_predicate(p)?);
    }
    Ok(Guard::all(out))
}

fn parse_state_key(field: &str) -> Result<StateKey, AgentError> {
    match field {
        "mode" => Ok(StateKey::Mode),
        "complexity" => Ok(StateKey::Complexity),
        "inferred_table_count" => Ok(StateKey::InferredTableCount),
        "has_raw_sql" => Ok(StateKey::HasRawSql),
        "has_base_sql" => Ok(StateKey::HasBaseSql),
        "has_sql" => Ok(StateKey::HasSql),
        "filter_has_in" => Ok(StateKey::FilterHasIn),
        "filter_has_like" => Ok(StateKey::FilterHasLike),
        "max_in_filter_size" => Ok(StateKey::MaxInFilterSize),
        other => Err(AgentError::UnknownStateKey(other.to_string())),
    }
}

fn parse_state_value(v: &serde_json::Value) -> StateValue {
    match v {
        serde_json::Value::Bool(b) => StateValue::Bool(*b),
        serde_json::Value::Number(n) => StateValue::Int(n.as_i64().unwrap_or_default()),
        other => StateValue::Str(other.as_str().unwrap_or_default().to_string()),
    }
}

fn parse_predicate(p: &RawPredicate) -> Result<Predicate, AgentError> {
    let key = parse_state_key(&p.field)?;
    match p.op.as_str() {
        "eq" => Ok(Predicate::Equals(key, parse_state_value(require_value(p)?))),
        "ne" => Ok(Predicate::NotEquals(key, parse_state_value(require_value(p)?))),
        "size_lte" => Ok(Predicate::SizeLte(key, require_int(p)?)),
        "size_gte" => Ok(Predicate::SizeGte(key, require_int(p)?)),
        "contains" => Ok(Predicate::Contains(key, parse_state_value(require_value(p)?))),
        "is_set" => Ok(Predicate::IsSet(key)),
        "is_unset" => Ok(Predicate::IsUnset(key)),
        "in" => {
            let values = p
                .values
                .as_ref()
                .ok_or_else(|| AgentError::Parse(format!("predicate '{}' missing values", p.field)))?;
            Ok(Predicate::In(key, values.iter().map(parse_state_value).collect()))
        }
        other => Err(AgentError::UnknownOperator(other.to_string())),
    }
}

fn require_value(p: &RawPredicate) -> Result<&serde_json::Value, AgentError> {
    p.value
        .as_ref()
        .ok_or_else(|| AgentError::Parse(format!("predicate '{}' missing value", p.field)))
}

fn require_int(p: &RawPredicate) -> Result<i64, AgentError> {
    require_value(p)?
        .as_i64()
        .ok_or_else(|| AgentError::Parse(format!("predicate '{}' value is not an integer", p.field)))
}
