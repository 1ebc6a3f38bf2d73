//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work a plan hands to workers. Each task
//! names the capability that must execute it, the tasks whose output it may
//! reference, and its current lifecycle status.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Identifier of a task, unique within one plan.
///
/// Ids are short human-chosen names (`research`, `draft`) because they are
/// also the keys of `${id}` placeholders in task inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name of a worker capability, the key of the worker registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(pub String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task status in its lifecycle.
///
/// Tasks start `Pending`; only the dispatcher moves them forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Planned but not yet dispatched.
    #[default]
    Pending,
    /// Handed to a worker.
    Running,
    /// Worker returned a result.
    Completed,
    /// Worker returned an error.
    Failed,
    /// Never executed (no worker, upstream incomplete, or cancelled).
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskStatus {
    /// Check if the status is terminal.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// A single subtask of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Free-form task kind, e.g. `literature_review`.
    #[serde(rename = "type")]
    pub task_type: String,
    pub assigned_capability: Capability,
    /// Tasks whose outputs this task may reference.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default)]
    pub description: String,
    /// Input fields; string values may hold `${task_id}` placeholders.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskRecord {
    /// Create a pending task with no dependencies or inputs.
    pub fn new(id: &str, task_type: &str, capability: &str, description: &str) -> Self {
        Self {
            id: TaskId::new(id),
            task_type: task_type.to_string(),
            assigned_capability: Capability::new(capability),
            dependencies: BTreeSet::new(),
            description: description.to_string(),
            inputs: Map::new(),
            status: TaskStatus::Pending,
        }
    }

    /// Builder-style dependency declaration.
    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.insert(TaskId::new(id));
        self
    }

    /// Builder-style input field.
    pub fn with_input(mut self, key: &str, value: Value) -> Self {
        self.inputs.insert(key.to_string(), value);
        self
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
    }

    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}
