//! Goal execution: plan, compose, dispatch layer by layer, record.
//!
//! The `Orchestrator` owns the worker registry and the calibrator. Each call
//! to `execute` plans the goal, validates the plan as a DAG, then runs its
//! layers in order. Tasks within a layer run concurrently, at most
//! `max_concurrent_workers` at a time. Completed tasks are calibrated and
//! recorded in the shared evidence graph.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::calibration::{CalibratedPrediction, ConformalCalibrator};
use crate::config::{Config, DEFAULT_EVENT_LOG_CAPACITY, DEFAULT_MAX_CONCURRENT_WORKERS};
use crate::core::{Capability, TaskId, TaskRecord, TaskStatus};
use crate::error::Result;
use crate::evidence::{task_node_id, worker_node_id, EvidenceGraph, Relation};
use crate::util::with_timeout;
use crate::workflow::{DirectoryTemplates, WorkflowComposer};
use crate::{twlog, twlog_debug, twlog_error, twlog_warn};

use super::events::{EventLog, RunEventKind};
use super::placeholder::{referenced_ids, resolve_inputs};
use super::planner::{Goal, Plan, PlanSource, Planner};
use super::registry::{Worker, WorkerRegistry};
use super::style::ExecutionStyle;

/// Unique identifier for one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex digits, for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run-scoped information handed to every worker.
///
/// Cancelling a context cancels its run. Workers receive a child context
/// whose token fires when the run is cancelled.
#[derive(Debug, Clone)]
pub struct Context {
    pub run_id: RunId,
    pub goal: String,
    /// Caller-supplied values shared by all tasks of the run.
    pub data: Map<String, Value>,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            goal: goal.into(),
            data: Map::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    fn child(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            goal: self.goal.clone(),
            data: self.data.clone(),
            cancel: self.cancel.child_token(),
        }
    }
}

/// Why a subtask did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// No worker is registered for the task's capability.
    #[error("no worker registered for capability {0}")]
    Dispatch(Capability),

    #[error("worker failed: {0}")]
    WorkerExecution(String),

    #[error("upstream task {0} did not complete")]
    UpstreamIncomplete(TaskId),

    #[error("run cancelled before the task finished")]
    Cancelled,
}

/// Outcome of one subtask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub capability: Capability,
    pub status: TaskStatus,
    pub payload: Option<Value>,
    pub confidence: Option<f64>,
    pub style: ExecutionStyle,
    pub calibration: Option<CalibratedPrediction<f64>>,
    /// Id of the worker that ran the task.
    pub worker: Option<String>,
    pub error: Option<TaskError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    fn skipped(task: &TaskRecord, error: TaskError) -> Self {
        Self {
            task_id: task.id.clone(),
            capability: task.assigned_capability.clone(),
            status: TaskStatus::Skipped,
            payload: None,
            confidence: None,
            style: ExecutionStyle::for_task(task),
            calibration: None,
            worker: None,
            error: Some(error),
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every layer was processed; individual tasks may still have failed.
    Completed,
    Cancelled,
}

/// Everything a run produced, tasks in plan layer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub run_id: RunId,
    pub goal: String,
    pub status: RunStatus,
    pub plan_source: PlanSource,
    pub layers: Vec<Vec<TaskId>>,
    pub tasks: Vec<TaskResult>,
}

impl AggregateResult {
    pub fn task(&self, id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task_id.as_str() == id)
    }

    pub fn completed_count(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(TaskStatus::Skipped)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// A task cleared for dispatch, inputs already resolved.
struct Dispatch {
    task: TaskRecord,
    worker: Arc<dyn Worker>,
}

/// Plans goals and dispatches their subtasks to registered workers.
pub struct Orchestrator {
    registry: WorkerRegistry,
    planner: Planner,
    composer: WorkflowComposer,
    calibrator: ConformalCalibrator,
    evidence: Arc<RwLock<EvidenceGraph>>,
    events: Arc<RwLock<EventLog>>,
    max_concurrent_workers: usize,
    worker_timeout: Option<Duration>,
}

impl Orchestrator {
    /// An orchestrator with no templates, no workers and default limits.
    pub fn new() -> Self {
        Self {
            registry: WorkerRegistry::new(),
            planner: Planner::without_templates(),
            composer: WorkflowComposer::new(),
            calibrator: ConformalCalibrator::default(),
            evidence: Arc::new(RwLock::new(EvidenceGraph::new())),
            events: Arc::new(RwLock::new(EventLog::new(DEFAULT_EVENT_LOG_CAPACITY))),
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            worker_timeout: None,
        }
    }

    /// Build from configuration, reading templates from its template dir.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let templates = DirectoryTemplates::new(config.templates_dir()?);
        twlog_debug!("templates from {}", templates.dir().display());
        Ok(Self {
            planner: Planner::new(Arc::new(templates)),
            calibrator: ConformalCalibrator::new(config.alpha)?,
            events: Arc::new(RwLock::new(EventLog::new(config.event_log_capacity))),
            max_concurrent_workers: config.max_concurrent_workers,
            worker_timeout: config.worker_timeout(),
            ..Self::new()
        })
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_calibrator(mut self, calibrator: ConformalCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    pub fn with_max_concurrent_workers(mut self, max: usize) -> Self {
        self.max_concurrent_workers = max.max(1);
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Register `worker` for `capability`; the previous worker is returned.
    pub fn register_worker(
        &mut self,
        capability: impl Into<Capability>,
        worker: Arc<dyn Worker>,
    ) -> Option<Arc<dyn Worker>> {
        self.registry.register(capability, worker)
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn plan(&self, goal: &Goal) -> Result<Plan> {
        self.planner.plan(goal)
    }

    /// Replace the calibration set used for subsequent runs.
    pub fn calibrate(&mut self, scores: &[f64]) {
        self.calibrator.calibrate(scores);
    }

    pub fn calibrator(&self) -> &ConformalCalibrator {
        &self.calibrator
    }

    pub fn evidence(&self) -> Arc<RwLock<EvidenceGraph>> {
        Arc::clone(&self.evidence)
    }

    pub fn events(&self) -> Arc<RwLock<EventLog>> {
        Arc::clone(&self.events)
    }

    /// Plan `goal` and run it to completion or cancellation.
    ///
    /// # Errors
    /// Structural failures abort the run before anything is dispatched:
    /// an unreadable template, a duplicate task id, a dependency on an
    /// unknown task, or a cycle. Per-task failures are reported in the
    /// returned `AggregateResult`.
    pub async fn execute(&self, goal: &Goal, context: &Context) -> Result<AggregateResult> {
        let run_id = context.run_id.clone();
        let plan = self
            .plan(goal)
            .inspect_err(|e| twlog_error!("run {}: planning failed: {}", run_id.short(), e))?;
        let plan_source = plan.source.clone();

        if plan.is_empty() {
            twlog!("run {}: empty plan, nothing to dispatch", run_id.short());
            self.record(&run_id, RunEventKind::RunFinished {
                completed: 0,
                failed: 0,
                skipped: 0,
            })
            .await;
            return Ok(AggregateResult {
                run_id,
                goal: goal.text.clone(),
                status: RunStatus::Completed,
                plan_source,
                layers: Vec::new(),
                tasks: Vec::new(),
            });
        }

        let composition = self
            .composer
            .compose_plan(plan.tasks)
            .inspect_err(|e| twlog_error!("run {}: {}", run_id.short(), e))?;
        let layers = composition.layers;
        let dag = composition.dag;

        twlog!(
            "run {}: {} tasks in {} layers",
            run_id.short(),
            dag.task_count(),
            layers.len()
        );
        self.record(&run_id, RunEventKind::RunStarted {
            goal: goal.text.clone(),
            tasks: dag.task_count(),
            layers: layers.len(),
        })
        .await;

        let worker_context = context.child();
        let mut results: HashMap<TaskId, TaskResult> = HashMap::new();
        let mut payloads: HashMap<TaskId, Value> = HashMap::new();
        let mut cancelled = context.is_cancelled();

        for (index, layer) in layers.iter().enumerate() {
            if cancelled || context.is_cancelled() {
                cancelled = true;
                break;
            }
            self.record(&run_id, RunEventKind::LayerStarted {
                index,
                tasks: layer.clone(),
            })
            .await;

            let mut ready = Vec::new();
            for id in layer {
                let Some(task) = dag.get_task(id) else {
                    continue;
                };
                match self.prepare(task, &results, &payloads) {
                    Ok(dispatch) => ready.push(dispatch),
                    Err(error) => {
                        twlog_warn!("run {}: skipping {}: {}", run_id.short(), id, error);
                        let skipped = TaskResult::skipped(task, error);
                        self.record(&run_id, RunEventKind::TaskFinished {
                            task_id: id.clone(),
                            status: skipped.status,
                        })
                        .await;
                        results.insert(id.clone(), skipped);
                    }
                }
            }

            let pending = stream::iter(ready.into_iter().map(|dispatch| self.run_task(dispatch, &worker_context)))
                .buffer_unordered(self.max_concurrent_workers);
            let mut pending = std::pin::pin!(pending);

            loop {
                tokio::select! {
                    biased;
                    _ = context.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = pending.next() => match next {
                        Some(result) => {
                            self.record_completion(&run_id, &result).await;
                            if let Some(payload) = result.payload.clone().filter(|_| result.is_completed()) {
                                payloads.insert(result.task_id.clone(), payload);
                            }
                            results.insert(result.task_id.clone(), result);
                        }
                        None => break,
                    }
                }
            }
        }

        if cancelled {
            twlog_warn!("run {}: cancelled", run_id.short());
            self.record(&run_id, RunEventKind::RunCancelled).await;
        }

        let tasks: Vec<TaskResult> = layers
            .iter()
            .flatten()
            .filter_map(|id| {
                results.remove(id).or_else(|| {
                    dag.get_task(id)
                        .map(|task| TaskResult::skipped(task, TaskError::Cancelled))
                })
            })
            .collect();

        let aggregate = AggregateResult {
            run_id: run_id.clone(),
            goal: goal.text.clone(),
            status: if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            },
            plan_source,
            layers,
            tasks,
        };

        twlog!(
            "run {}: {} completed, {} failed, {} skipped",
            run_id.short(),
            aggregate.completed_count(),
            aggregate.failed_count(),
            aggregate.skipped_count()
        );
        self.record(&run_id, RunEventKind::RunFinished {
            completed: aggregate.completed_count(),
            failed: aggregate.failed_count(),
            skipped: aggregate.skipped_count(),
        })
        .await;

        Ok(aggregate)
    }

    /// Check upstream results and worker availability, then resolve inputs.
    fn prepare(
        &self,
        task: &TaskRecord,
        results: &HashMap<TaskId, TaskResult>,
        payloads: &HashMap<TaskId, Value>,
    ) -> std::result::Result<Dispatch, TaskError> {
        if let Some(upstream) = task
            .dependencies
            .iter()
            .find(|dep| !results.get(*dep).is_some_and(TaskResult::is_completed))
        {
            return Err(TaskError::UpstreamIncomplete(upstream.clone()));
        }

        let worker = self
            .registry
            .get(&task.assigned_capability)
            .ok_or_else(|| TaskError::Dispatch(task.assigned_capability.clone()))?;

        for referenced in task.inputs.values().flat_map(referenced_ids) {
            if !task.dependencies.contains(&referenced) {
                twlog_warn!(
                    "task {} references ${{{}}} without depending on it",
                    task.id,
                    referenced
                );
            }
        }

        let mut task = task.clone();
        task.inputs = resolve_inputs(&task.inputs, payloads);
        Ok(Dispatch { task, worker })
    }

    async fn run_task(&self, dispatch: Dispatch, context: &Context) -> TaskResult {
        let Dispatch { mut task, worker } = dispatch;
        let style = ExecutionStyle::for_task(&task);
        task.start();

        self.record(&context.run_id, RunEventKind::TaskDispatched {
            task_id: task.id.clone(),
            capability: task.assigned_capability.clone(),
        })
        .await;
        twlog_debug!(
            "run {}: {} -> {} ({})",
            context.run_id.short(),
            task.id,
            worker.id(),
            style
        );

        let started_at = Utc::now();
        let outcome = with_timeout(self.worker_timeout, worker.execute(&task, context)).await;

        let mut result = TaskResult {
            task_id: task.id.clone(),
            capability: task.assigned_capability.clone(),
            status: TaskStatus::Completed,
            payload: None,
            confidence: None,
            style,
            calibration: None,
            worker: Some(worker.id().to_string()),
            error: None,
            started_at: Some(started_at),
            finished_at: Utc::now(),
        };

        match outcome {
            Ok(Ok(output)) => {
                result.calibration = output
                    .confidence
                    .map(|c| self.calibrator.predict_with_interval(c, 1.0 - c));
                result.confidence = output.confidence;
                result.payload = Some(output.payload);
            }
            Ok(Err(error)) => {
                result.status = TaskStatus::Failed;
                result.error = Some(TaskError::WorkerExecution(error.to_string()));
            }
            Err(error) => {
                result.status = TaskStatus::Failed;
                result.error = Some(TaskError::WorkerExecution(error.to_string()));
            }
        }
        result
    }

    /// Log the outcome and write `EXECUTES` evidence for completed tasks.
    async fn record_completion(&self, run_id: &RunId, result: &TaskResult) {
        self.record(run_id, RunEventKind::TaskFinished {
            task_id: result.task_id.clone(),
            status: result.status,
        })
        .await;

        if let Some(error) = &result.error {
            twlog_warn!("run {}: {} {}", run_id.short(), result.task_id, error);
        }

        if !result.is_completed() {
            return;
        }
        let Some(worker_id) = result.worker.as_deref() else {
            return;
        };

        let mut metadata = Map::new();
        metadata.insert("run_id".to_string(), json!(run_id));
        metadata.insert("capability".to_string(), json!(result.capability));

        let task_node = task_node_id(result.task_id.as_str());
        let mut evidence = self.evidence.write().await;
        evidence.add_evidence(&worker_node_id(worker_id), &task_node, Relation::Executes, metadata);
        if let Some(calibration) = &result.calibration {
            evidence.set_conformal_confidence(&task_node, calibration.clone());
        }
    }

    async fn record(&self, run_id: &RunId, kind: RunEventKind) {
        self.events.write().await.record(run_id, kind);
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("max_concurrent_workers", &self.max_concurrent_workers)
            .field("worker_timeout", &self.worker_timeout)
            .finish_non_exhaustive()
    }
}
