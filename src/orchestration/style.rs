//! Execution-style selection for subtasks.
//!
//! The style is metadata for workers and callers: it does not change how
//! the orchestrator dispatches a task.

use serde::{Deserialize, Serialize};

use crate::core::TaskRecord;

/// How a subtask is expected to be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStyle {
    /// Multi-party dialogue.
    Conversational,
    /// A team of agents with distinct roles.
    RoleBased,
    /// Cyclic refinement over explicit state.
    Stateful,
    /// Straight-line steps.
    #[default]
    Procedural,
}

impl std::fmt::Display for ExecutionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStyle::Conversational => write!(f, "conversational"),
            ExecutionStyle::RoleBased => write!(f, "role_based"),
            ExecutionStyle::Stateful => write!(f, "stateful"),
            ExecutionStyle::Procedural => write!(f, "procedural"),
        }
    }
}

/// Ordered keyword table; the first row with a matching word wins.
const STYLE_RULES: &[(&[&str], ExecutionStyle)] = &[
    (
        &["chat", "discuss", "conversation", "debate", "brainstorm"],
        ExecutionStyle::Conversational,
    ),
    (&["team", "role", "crew", "review"], ExecutionStyle::RoleBased),
    (
        &["iterat", "loop", "refine", "until", "retry", "stateful", "cycle"],
        ExecutionStyle::Stateful,
    ),
];

/// Pick a style from a task type and description.
///
/// Words are compared case-insensitively by prefix, so `reviewers` matches
/// `review` and both `iterative` and `iteration` match the stem `iterat`.
pub fn select_style(task_type: &str, description: &str) -> ExecutionStyle {
    let text = format!("{} {}", task_type, description).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    STYLE_RULES
        .iter()
        .find(|(keywords, _)| {
            keywords
                .iter()
                .any(|k| words.iter().any(|w| w.starts_with(k)))
        })
        .map(|(_, style)| *style)
        .unwrap_or_default()
}

impl ExecutionStyle {
    pub fn for_task(task: &TaskRecord) -> Self {
        select_style(&task.task_type, &task.description)
    }
}
