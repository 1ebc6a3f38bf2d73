//! Orchestration layer: planning goals and dispatching subtasks.
//!
//! The `Orchestrator` turns a goal into a plan, validates it through the
//! workflow composer and dispatches each layer to capability-keyed workers.

mod events;
mod orchestrator;
mod placeholder;
mod planner;
mod registry;
mod style;

pub use events::{EventLog, RunEvent, RunEventKind};
pub use orchestrator::{
    AggregateResult, Context, Orchestrator, RunId, RunStatus, TaskError, TaskResult,
};
pub use placeholder::{referenced_ids, resolve_inputs, resolve_value};
pub use planner::{Goal, Plan, PlanSource, Planner, DEFAULT_CAPABILITY};
pub use registry::{Worker, WorkerError, WorkerOutput, WorkerRegistry};
pub use style::{select_style, ExecutionStyle};
