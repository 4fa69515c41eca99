//! Task-graph convergence engine.
//!
//! The engine takes a fully-constructed set of [`Task`]s describing desired
//! cloud state, discovers actual state, diffs the two, and applies only the
//! divergent fields, in dependency order and with bounded parallelism.
//! Tasks are per-resource-kind plug-ins; the engine owns ordering, retries,
//! failure isolation, and reporting.
//!
//! A pass renders against a single [`Target`]: `Api` mutates live provider
//! state, `Text` accumulates a declarative resource document without
//! touching any API. Re-running a pass against converged state is a no-op.

pub mod context;
pub mod deletion;
pub mod executor;
pub mod graph;
pub mod lock;
pub mod report;
pub mod reporter;
pub mod target;
pub mod task;

pub use context::Context;
pub use deletion::Deletion;
pub use executor::{CancelToken, Executor, ExecutorOptions};
pub use graph::TaskGraph;
pub use lock::KeyedLocks;
pub use report::{ConvergenceReport, TaskOutcome, TaskReport};
pub use reporter::{CollectingReporter, EngineEvent, Reporter, TracingReporter};
pub use target::{ApiTarget, AttrValue, DocumentSink, ResourceRecord, Target, TextTarget};
pub use task::{serialize_state, Task, TaskId, TaskSet};

// The core state-comparison types, re-exported so task implementations
// depend on one crate
pub use groundwork_core::{
    diff_states, ChangeSet, DiffSchema, EngineConfig, EngineError, FieldChange, Lifecycle, Result,
};
