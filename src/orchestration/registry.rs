//! Capability-keyed worker registry.
//!
//! Workers are injected as `Arc<dyn Worker>` and looked up by the
//! capability a task is assigned to. Registration is an upsert: the last
//! worker registered for a capability wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Capability, TaskRecord};
use crate::orchestration::orchestrator::Context;
use crate::twlog_debug;

/// What a worker hands back for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Opaque result; downstream tasks see it through `${task_id}`.
    pub payload: Value,
    /// Self-reported confidence in `[0, 1]`, if the worker has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl WorkerOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Failure reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("worker observed cancellation")]
    Cancelled,
}

/// Uniform task-execution contract.
///
/// Implementations must be cheap to share; the orchestrator may call
/// `execute` concurrently for tasks of the same layer.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable identifier recorded as the source of `EXECUTES` evidence.
    fn id(&self) -> &str;

    async fn execute(&self, task: &TaskRecord, context: &Context) -> Result<WorkerOutput, WorkerError>;
}

/// Maps each capability to the worker that serves it.
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<Capability, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` for `capability`, returning the worker it replaced.
    pub fn register(
        &mut self,
        capability: impl Into<Capability>,
        worker: Arc<dyn Worker>,
    ) -> Option<Arc<dyn Worker>> {
        let capability = capability.into();
        twlog_debug!("register worker {} for {}", worker.id(), capability);
        self.workers.insert(capability, worker)
    }

    pub fn unregister(&mut self, capability: &Capability) -> Option<Arc<dyn Worker>> {
        self.workers.remove(capability)
    }

    pub fn get(&self, capability: &Capability) -> Option<Arc<dyn Worker>> {
        self.workers.get(capability).cloned()
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.workers.contains_key(capability)
    }

    /// Registered capabilities, sorted.
    pub fn capabilities(&self) -> Vec<&Capability> {
        let mut capabilities: Vec<_> = self.workers.keys().collect();
        capabilities.sort();
        capabilities
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.capabilities()
                    .into_iter()
                    .map(|cap| (cap.as_str(), self.workers[cap].id())),
            )
            .finish()
    }
}
