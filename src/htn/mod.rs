//! The Hierarchical Task Network planning kernel: tasks, methods,
//! primitives, and the deterministic decomposition driver.

pub mod kernel;
pub mod primitives;

pub use kernel::{plan, CancellationToken, Guard, Method, MethodCatalog, PlannerError, Predicate, Task, TraceStep};
pub use primitives::{
    JoinError, Primitive, PrimitiveError, PrimitiveRegistry, SpecError, BUILTIN_PRIMITIVE_NAMES,
};
