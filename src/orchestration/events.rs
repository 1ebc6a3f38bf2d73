//! Bounded, append-only log of run events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::{Capability, TaskId, TaskStatus};

use super::orchestrator::RunId;

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted { goal: String, tasks: usize, layers: usize },
    LayerStarted { index: usize, tasks: Vec<TaskId> },
    TaskDispatched { task_id: TaskId, capability: Capability },
    TaskFinished { task_id: TaskId, status: TaskStatus },
    RunCancelled,
    RunFinished { completed: usize, failed: usize, skipped: usize },
}

/// One timestamped event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub run_id: RunId,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// Keeps the most recent `capacity` events; older ones are dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<RunEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventLog {
    /// A log holding at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn record(&mut self, run_id: &RunId, kind: RunEventKind) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(RunEvent {
            at: Utc::now(),
            run_id: run_id.clone(),
            kind,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunEvent> {
        self.events.iter()
    }

    /// Events belonging to one run, oldest first.
    pub fn for_run<'a>(&'a self, run_id: &'a RunId) -> impl Iterator<Item = &'a RunEvent> + 'a {
        self.events.iter().filter(move |e| &e.run_id == run_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
