//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! This module provides the TaskDAG structure that represents task dependencies
//! as a directed graph and partitions it into layers of mutually independent
//! tasks that may execute in parallel.

use crate::core::task::{TaskId, TaskRecord};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// The task dependency graph.
///
/// TaskDAG uses petgraph's DiGraph to represent task dependencies.
/// Nodes are tasks; an edge `a -> b` means `a` must finish before `b` starts.
/// Node indices follow insertion order, which is also plan order.
pub struct TaskDAG {
    /// The underlying directed graph.
    graph: DiGraph<TaskRecord, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task to the DAG.
    ///
    /// # Errors
    /// Returns `Error::DuplicateTask` if a task with the same id is present.
    pub fn add_task(&mut self, task: TaskRecord) -> Result<NodeIndex> {
        if self.task_index.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id.to_string()));
        }

        let id = task.id.clone();
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        Ok(index)
    }

    /// Add an edge meaning `from` must complete before `to` can start.
    ///
    /// Cycles are not rejected here; they surface from `layers` and
    /// `topological_order` so a whole graph can be validated at once.
    /// Repeating an edge is a no-op.
    ///
    /// # Errors
    /// Returns `Error::UnknownTask` if either endpoint is not in the DAG.
    pub fn add_edge(&mut self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        self.graph.update_edge(from_index, to_index, ());
        Ok(())
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.task_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownTask(id.to_string()))
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get a mutable reference to a task by its ID.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph.node_weight_mut(index)
        } else {
            None
        }
    }

    /// Get the number of tasks in the DAG.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependencies (edges) in the DAG.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the DAG is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the DAG contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Check if a dependency exists between two tasks.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.task_index.get(from), self.task_index.get(to))
        {
            self.graph.find_edge(from_idx, to_idx).is_some()
        } else {
            false
        }
    }

    /// Get all tasks that the given task depends on (predecessors).
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&TaskRecord> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Get all tasks that depend on the given task (successors).
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&TaskRecord> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&TaskRecord> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph
                .neighbors_directed(index, direction)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Get all tasks in plan order.
    pub fn all_tasks(&self) -> Vec<&TaskRecord> {
        self.graph.node_weights().collect()
    }

    /// Consume the DAG, returning its tasks in plan order.
    pub fn into_tasks(self) -> Vec<TaskRecord> {
        let (nodes, _) = self.graph.into_nodes_edges();
        nodes.into_iter().map(|node| node.weight).collect()
    }

    /// Check the graph has no directed cycle.
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Get tasks in topological order (respecting dependencies).
    ///
    /// # Errors
    /// Returns `Error::Cycle` naming a task on a cycle.
    pub fn topological_order(&self) -> Result<Vec<&TaskRecord>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| self.cycle_error(cycle.node_id()))?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }

    /// Partition the tasks into Kahn layers.
    ///
    /// Layer 0 holds every task without dependencies; layer `k + 1` holds every
    /// remaining task whose dependencies all sit in layers `0..=k`. Each task
    /// appears in exactly one layer and every edge points to a strictly later
    /// layer. Within a layer tasks keep plan order.
    ///
    /// # Errors
    /// Returns `Error::Cycle` before computing any layer if the graph is cyclic.
    pub fn layers(&self) -> Result<Vec<Vec<TaskId>>> {
        if let Err(cycle) = toposort(&self.graph, None) {
            return Err(self.cycle_error(cycle.node_id()));
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|index| {
                let degree = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count();
                (index, degree)
            })
            .collect();

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| in_degree.get(index) == Some(&0))
            .collect();

        let mut layers = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for &index in &current {
                for successor in self.graph.neighbors_directed(index, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&successor) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(successor);
                        }
                    }
                }
            }
            next.sort_by_key(|index| index.index());

            placed += current.len();
            layers.push(
                current
                    .iter()
                    .filter_map(|&index| self.graph.node_weight(index))
                    .map(|task| task.id.clone())
                    .collect(),
            );
            current = next;
        }

        if placed != self.graph.node_count() {
            // Nodes left with a positive in-degree sit on a cycle.
            let stuck = in_degree
                .iter()
                .find(|(_, &degree)| degree > 0)
                .map(|(&index, _)| index);
            return Err(match stuck {
                Some(index) => self.cycle_error(index),
                None => Error::Validation("layering did not place every task".to_string()),
            });
        }

        Ok(layers)
    }

    fn cycle_error(&self, index: NodeIndex) -> Error {
        let task = self
            .graph
            .node_weight(index)
            .map(|t| t.id.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Error::Cycle { task }
    }

    /// Get the underlying graph for advanced operations.
    pub fn graph(&self) -> &DiGraph<TaskRecord, ()> {
        &self.graph
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
