//! Workflow composition and external workflow templates.
//!
//! The composer validates task graphs as DAGs and computes the layers the
//! orchestrator dispatches in parallel; templates supply predefined plans
//! keyed by task type.

mod composer;
mod template;

pub use composer::{Composition, Validation, WorkflowComposer, WorkflowEdge};
pub use template::{
    DirectoryTemplates, InMemoryTemplates, TemplateStep, TemplateStore, WorkflowTemplate,
};
