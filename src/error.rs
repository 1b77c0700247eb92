use crate::core::task::TaskId;
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

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {task_id} has invalid parameters: {reason}")]
    InvalidParameters { task_id: TaskId, reason: String },

    #[error("Task {task_id} depends on unknown task {missing}")]
    UnknownDependency { task_id: TaskId, missing: TaskId },

    #[error("Cyclic dependency among tasks: {}", join_ids(.cycle))]
    CyclicDependency { cycle: Vec<TaskId> },
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single task's interpreter call.
///
/// These never abort a run: the executor records them on the task's
/// result and skips the task's dependents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskExecutionError {
    #[error("unknown column: {0}")]
    MissingColumn(String),

    #[error("type mismatch on column {column}: {detail}")]
    TypeMismatch { column: String, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{agg} of {field} over empty input")]
    EmptyAggregate { agg: String, field: String },

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl From<String> for TaskExecutionError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for TaskExecutionError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
