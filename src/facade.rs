//! The caller-facing entry point: wires a schema graph, a method catalog,
//! and a primitive registry together and drives the planner to either a
//! SQL string or an executed result (spec.md §4.G, §6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::htn::kernel::{plan, CancellationToken as KernelCancellationToken, MethodCatalog, PlannerError, Task, TraceStep};
use crate::htn::primitives::PrimitiveRegistry;
use crate::planning_state::{BoundValue, PlanningState};
use crate::report_spec::ReportSpec;
use crate::schema_graph::SchemaGraph;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("database boundary error: {0}")]
    Backend(String),
}

/// Errors a facade call can fail with: planning failures (spec.md §4.C)
/// or a failure at the database-execution boundary, which sits outside
/// the planner entirely.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// The database-execution boundary. Out of scope for this crate's core
/// (spec.md Non-goals) but a facade needs something to call once it has
/// planned SQL; callers supply their own implementation.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        bound_values: &[BoundValue],
    ) -> Result<Vec<serde_json::Value>, ExecutionError>;
}

/// A no-op executor for callers that only want planned SQL, never run
/// against a live backend (used by the CLI binary and integration tests).
pub struct NullExecutor;

#[async_trait]
impl Executor for NullExecutor {
    async fn execute(
        &self,
        _sql: &str,
        _bound_values: &[BoundValue],
    ) -> Result<Vec<serde_json::Value>, ExecutionError> {
        Ok(Vec::new())
    }
}

/// Atomic-bool-backed cancellation token, handed to callers so they can
/// cancel an in-flight `run_report` from another thread (spec.md §5).
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl KernelCancellationToken for CancellationFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The result of a completed report: the planned SQL, its bound values,
/// and (if an executor was supplied) any rows it returned.
#[derive(Debug, Clone)]
pub struct ReportResult {
    pub sql: String,
    pub bound_values: Vec<BoundValue>,
    pub rows: Vec<serde_json::Value>,
}

/// Ties a schema graph, method catalog, and primitive registry together
/// into one callable surface.
pub struct QueryEngine {
    schema: Arc<SchemaGraph>,
    methods: MethodCatalog,
    primitives: PrimitiveRegistry,
    executor: Arc<dyn Executor>,
}

impl QueryEngine {
    /// Build an engine using the built-in `AnswerReport` catalog and the
    /// given executor. `max_in_filter_size` is the same knob
    /// `config::EngineConfig` validates; it sets `AnalyzeComplexity`'s
    /// oversized-`IN` threshold (spec.md §4.D).
    pub fn new(schema: Arc<SchemaGraph>, executor: Arc<dyn Executor>, max_in_filter_size: u32) -> Self {
        let primitives = PrimitiveRegistry::builtin(schema.clone(), max_in_filter_size);
        Self {
            schema,
            methods: crate::agents::builtin_catalog(),
            primitives,
            executor,
        }
    }

    /// Build an engine with a caller-supplied method catalog, e.g. one
    /// parsed from a DSL document via `agent_dsl::parse_catalog`.
    pub fn with_catalog(
        schema: Arc<SchemaGraph>,
        methods: MethodCatalog,
        executor: Arc<dyn Executor>,
        max_in_filter_size: u32,
    ) -> Self {
        let primitives = PrimitiveRegistry::builtin(schema.clone(), max_in_filter_size);
        Self {
            schema,
            methods,
            primitives,
            executor,
        }
    }

    pub fn schema(&self) -> &SchemaGraph {
        &self.schema
    }

    /// Plan and execute a report, discarding the planning trace.
    pub async fn run_report(&self, spec: ReportSpec) -> Result<ReportResult, FacadeError> {
        let (result, _trace) = self.run_report_with_trace(spec, None).await?;
        Ok(result)
    }

    /// Plan and execute a report, returning the full decomposition trace
    /// alongside the result (spec.md §3, §6).
    pub async fn run_report_with_trace(
        &self,
        spec: ReportSpec,
        cancellation: Option<&CancellationFlag>,
    ) -> Result<(ReportResult, Vec<TraceStep>), FacadeError> {
        let initial = PlanningState::new(spec);
        let cancellation_ref: Option<&dyn KernelCancellationToken> =
            cancellation.map(|c| c as &dyn KernelCancellationToken);
        let (final_state, trace) = plan(
            Task::compound("AnswerReport"),
            initial,
            &self.methods,
            &self.primitives,
            cancellation_ref,
        )?;

        debug!("planning trace: {} steps", trace.len());

        let sql = final_state.sql.clone().unwrap_or_default();
        let rows = self
            .executor
            .execute(&sql, &final_state.bound_values)
            .await?;

        Ok((
            ReportResult {
                sql,
                bound_values: final_state.bound_values,
                rows,
            },
            trace,
        ))
    }
}
