//! Workflow composition: DAG validation and parallel layering.
//!
//! The composer turns a list of tasks and dependency edges into a validated
//! `TaskDAG` plus the ordered layers the dispatcher executes. A cyclic graph
//! is rejected as a whole; nothing is layered or dispatched.

use serde::{Deserialize, Serialize};

use crate::core::{TaskDAG, TaskId, TaskRecord};
use crate::error::Result;
use crate::{twlog, twlog_debug};

/// A dependency edge: `from` must finish before `to` starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: TaskId,
    pub to: TaskId,
}

impl WorkflowEdge {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: TaskId::new(from),
            to: TaskId::new(to),
        }
    }
}

/// Outcome of validating a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validation {
    Passed,
}

/// A validated workflow ready for dispatch.
#[derive(Debug)]
pub struct Composition {
    /// The validated graph.
    pub dag: TaskDAG,
    /// Kahn layers; each inner list may run in parallel.
    pub layers: Vec<Vec<TaskId>>,
    pub validation: Validation,
}

impl Composition {
    pub fn task_count(&self) -> usize {
        self.dag.task_count()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Index of the layer holding `id`, if any.
    pub fn layer_of(&self, id: &TaskId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.contains(id))
    }
}

/// Validates task graphs and computes their execution layers.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowComposer;

impl WorkflowComposer {
    pub fn new() -> Self {
        Self
    }

    /// Build and validate a DAG from explicit nodes and edges.
    ///
    /// # Errors
    /// - `Error::DuplicateTask` if two nodes share an id
    /// - `Error::UnknownTask` if an edge names a missing node
    /// - `Error::Cycle` if the graph is not acyclic
    pub fn compose(&self, nodes: Vec<TaskRecord>, edges: &[WorkflowEdge]) -> Result<Composition> {
        let node_count = nodes.len();
        let mut dag = TaskDAG::new();
        for node in nodes {
            dag.add_task(node)?;
        }
        for edge in edges {
            dag.add_edge(&edge.from, &edge.to)?;
        }

        let layers = dag.layers()?;

        twlog!(
            "Composed workflow with {} nodes and {} dependencies into {} layers",
            node_count,
            dag.dependency_count(),
            layers.len()
        );
        for (index, layer) in layers.iter().enumerate() {
            twlog_debug!("layer {}: {:?}", index, layer);
        }

        Ok(Composition {
            dag,
            layers,
            validation: Validation::Passed,
        })
    }

    /// Compose a plan, deriving edges from each task's `dependencies`.
    pub fn compose_plan(&self, tasks: Vec<TaskRecord>) -> Result<Composition> {
        let edges: Vec<WorkflowEdge> = tasks
            .iter()
            .flat_map(|task| {
                task.dependencies.iter().map(|dep| WorkflowEdge {
                    from: dep.clone(),
                    to: task.id.clone(),
                })
            })
            .collect();
        self.compose(tasks, &edges)
    }
}
