//! HTNQL - turns a declarative report description into executable SQL by
//! inferring joins from a schema's foreign-key graph.
//!
//! A Hierarchical Task Network planner (`htn`) decomposes an `AnswerReport`
//! goal into primitive operations: choosing an execution mode, inferring
//! which tables a query touches, synthesizing a join forest from the
//! schema graph, and building the final SQL string. Everything the
//! planner touches is deterministic — same spec and schema always produce
//! the same SQL and the same decomposition trace.

pub mod agent_dsl;
pub mod agents;
pub mod config;
pub mod facade;
pub mod htn;
pub mod planning_state;
pub mod report_spec;
pub mod schema_graph;
pub mod shape_suggestion;
pub mod sql_builder;

pub use facade::{FacadeError, QueryEngine};
pub use report_spec::ReportSpec;
pub use schema_graph::SchemaGraph;
