use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    /// The workflow graph is not a DAG. Fatal to the whole run.
    #[error("Workflow must be a directed acyclic graph: cycle detected at task {task}")]
    Cycle { task: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Workflow template not found: {0}")]
    TemplateNotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
