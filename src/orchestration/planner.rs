//! Goal decomposition into a subtask plan.
//!
//! A plan comes from the first matching row of a fixed decision table:
//!
//! 1. blank goal text: empty plan
//! 2. a template is installed for the goal's task type: template steps
//! 3. a fallback rule's keyword appears in the goal text: that rule's chain
//! 4. otherwise: one direct task
//!
//! The result depends only on `(task_type, text)` and the installed templates.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::core::TaskRecord;
use crate::error::Result;
use crate::workflow::{InMemoryTemplates, TemplateStore};
use crate::{twlog, twlog_debug};

/// Capability used by a direct task when the goal has no task type.
pub const DEFAULT_CAPABILITY: &str = "general";

/// A high-level request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Optional task type; selects a template and the direct capability.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    pub text: String,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            task_type: None,
            text: text.into(),
        }
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }
}

impl From<&str> for Goal {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Which row of the decision table produced a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSource {
    /// Blank goal; nothing to do.
    Empty,
    Template { id: String },
    Rule { name: String },
    Direct,
}

/// Ordered subtasks for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub source: PlanSource,
    pub tasks: Vec<TaskRecord>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// A static decomposition keyed on words in the goal text.
struct FallbackRule {
    name: &'static str,
    keywords: &'static [&'static str],
    build: fn(&str) -> Vec<TaskRecord>,
}

const FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        name: "manuscript",
        keywords: &["paper", "manuscript"],
        build: manuscript_chain,
    },
    FallbackRule {
        name: "presentation",
        keywords: &["slides", "presentation"],
        build: presentation_chain,
    },
];

fn research_step(goal: &str) -> TaskRecord {
    TaskRecord::new("research", "research", "research", goal)
}

fn manuscript_chain(goal: &str) -> Vec<TaskRecord> {
    vec![
        research_step(goal),
        TaskRecord::new("draft", "draft", "writing", goal)
            .depends_on("research")
            .with_input("sources", json!("${research}")),
    ]
}

fn presentation_chain(goal: &str) -> Vec<TaskRecord> {
    vec![
        research_step(goal),
        TaskRecord::new("slides", "slides", "presentation", goal)
            .depends_on("research")
            .with_input("sources", json!("${research}")),
    ]
}

/// Resolves goals into plans.
#[derive(Clone)]
pub struct Planner {
    templates: Arc<dyn TemplateStore>,
}

impl Planner {
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        Self { templates }
    }

    /// A planner with no templates installed.
    pub fn without_templates() -> Self {
        Self::new(Arc::new(InMemoryTemplates::new()))
    }

    /// Decompose `goal` into subtasks.
    ///
    /// # Errors
    /// Fails only when an installed template cannot be read or parsed.
    pub fn plan(&self, goal: &Goal) -> Result<Plan> {
        let text = goal.text.trim();
        if text.is_empty() {
            twlog_debug!("plan: blank goal, empty plan");
            return Ok(Plan {
                source: PlanSource::Empty,
                tasks: Vec::new(),
            });
        }

        if let Some(task_type) = goal.task_type.as_deref() {
            if let Some(template) = self.templates.load(task_type)? {
                twlog!("plan: template {} ({} steps)", template.id, template.steps.len());
                return Ok(Plan {
                    tasks: template.to_tasks(text),
                    source: PlanSource::Template { id: template.id },
                });
            }
        }

        let lowered = text.to_lowercase();
        if let Some(rule) = FALLBACK_RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
        {
            twlog!("plan: fallback rule {}", rule.name);
            return Ok(Plan {
                source: PlanSource::Rule {
                    name: rule.name.to_string(),
                },
                tasks: (rule.build)(text),
            });
        }

        let capability = goal.task_type.as_deref().unwrap_or(DEFAULT_CAPABILITY);
        twlog!("plan: direct task on {}", capability);
        Ok(Plan {
            source: PlanSource::Direct,
            tasks: vec![TaskRecord::new("direct", capability, capability, text)],
        })
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::without_templates()
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner").finish_non_exhaustive()
    }
}
