//! External workflow templates, keyed by task type.
//!
//! A template is an ordered list of steps stored as `<dir>/<id>.toml`:
//!
//! ```toml
//! [[steps]]
//! id = "lit_review"
//! assigned_capability = "research"
//!
//! [[steps]]
//! id = "drafting"
//! assigned_capability = "writing"
//! dependencies = ["lit_review"]
//! inputs = { sources = "${lit_review}" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{Capability, TaskId, TaskRecord, TaskStatus};
use crate::error::Result;
use crate::twlog_debug;

/// One step of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
    pub id: String,
    pub assigned_capability: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

/// An ordered list of steps loaded by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Template id; filled from the file stem when absent.
    #[serde(default)]
    pub id: String,
    pub steps: Vec<TemplateStep>,
}

impl WorkflowTemplate {
    /// Parse a template from TOML text.
    pub fn from_toml_str(id: &str, text: &str) -> Result<Self> {
        let mut template: Self = toml::from_str(text)?;
        if template.id.is_empty() {
            template.id = id.to_string();
        }
        Ok(template)
    }

    /// Read a template file; the id defaults to the file stem.
    pub fn from_file(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_toml_str(&stem, &fs::read_to_string(path)?)
    }

    /// Instantiate the steps as pending tasks for `goal`.
    ///
    /// Steps without a description inherit the goal text; steps without a
    /// type inherit the template id.
    pub fn to_tasks(&self, goal: &str) -> Vec<TaskRecord> {
        self.steps
            .iter()
            .map(|step| TaskRecord {
                id: TaskId::new(step.id.as_str()),
                task_type: step.step_type.clone().unwrap_or_else(|| self.id.clone()),
                assigned_capability: Capability::new(step.assigned_capability.as_str()),
                dependencies: step.dependencies.iter().map(|d| TaskId::new(d.as_str())).collect(),
                description: step.description.clone().unwrap_or_else(|| goal.to_string()),
                inputs: step.inputs.clone(),
                status: TaskStatus::Pending,
            })
            .collect()
    }
}

/// Source of workflow templates.
pub trait TemplateStore: Send + Sync {
    /// Load the template registered under `id`, if any.
    ///
    /// # Errors
    /// A template that exists but cannot be read or parsed is an error;
    /// a missing template is `Ok(None)`.
    fn load(&self, id: &str) -> Result<Option<WorkflowTemplate>>;
}

/// Templates stored as `<dir>/<id>.toml`.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    dir: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Template ids double as file names, so only plain names are looked up.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl TemplateStore for DirectoryTemplates {
    fn load(&self, id: &str) -> Result<Option<WorkflowTemplate>> {
        if !is_plain_id(id) {
            return Ok(None);
        }
        let path = self.dir.join(format!("{}.toml", id));
        if !path.exists() {
            twlog_debug!("No template at {}", path.display());
            return Ok(None);
        }
        twlog_debug!("Loading template {}", path.display());
        WorkflowTemplate::from_file(&path).map(Some)
    }
}

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplates {
    templates: HashMap<String, WorkflowTemplate>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its own id, replacing any previous one.
    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.id.clone(), template);
    }
}

impl TemplateStore for InMemoryTemplates {
    fn load(&self, id: &str) -> Result<Option<WorkflowTemplate>> {
        Ok(self.templates.get(id).cloned())
    }
}
