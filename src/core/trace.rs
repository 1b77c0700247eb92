//! Per-task results and the execution trace of a run.

use crate::core::payload::Payload;
use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Terminal status of a task in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// The interpreter returned a payload.
    Done,
    /// The interpreter call failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Never dispatched because an ancestor failed.
    Skipped {
        /// The failed task that caused the skip.
        cause: TaskId,
    },
}

impl TaskStatus {
    /// Whether the task was handed to a worker (`done` or `failed`).
    pub fn was_dispatched(&self) -> bool {
        !matches!(self, TaskStatus::Skipped { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Skipped { cause } => write!(f, "skipped: {} failed", cause),
        }
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Output; present only when the task is done.
    pub payload: Option<Arc<Payload>>,
    /// Taken immediately before the interpreter call.
    pub started_at: Option<DateTime<Utc>>,
    /// Taken immediately after the interpreter call.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    pub fn done(
        task_id: TaskId,
        payload: Payload,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Done,
            payload: Some(Arc::new(payload)),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
        }
    }

    pub fn failed(
        task_id: TaskId,
        error: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed { error },
            payload: None,
            started_at: Some(started_at),
            finished_at: Some(finished_at),
        }
    }

    pub fn skipped(task_id: TaskId, cause: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Skipped { cause },
            payload: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Wall-clock seconds spent in the interpreter; zero if never dispatched.
    pub fn duration_secs(&self) -> f64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => seconds_between(start, end),
            _ => 0.0,
        }
    }
}

/// Everything observed during one run, ordered by layer.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionTrace {
    /// One entry per plan layer, in plan order; within a layer, plan order.
    pub layers: Vec<Vec<TaskResult>>,
    /// Processor count the run was configured with.
    pub processor_count: usize,
    /// Size of the largest plan layer.
    pub max_parallelism: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionTrace {
    /// All results in layer order.
    pub fn results(&self) -> impl Iterator<Item = &TaskResult> {
        self.layers.iter().flatten()
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results().find(|r| &r.task_id == id)
    }

    /// Results keyed by task id.
    pub fn by_id(&self) -> HashMap<&TaskId, &TaskResult> {
        self.results().map(|r| (&r.task_id, r)).collect()
    }

    /// Plan-level wall-clock seconds from first dispatch to last completion.
    pub fn elapsed_secs(&self) -> f64 {
        seconds_between(self.started_at, self.finished_at)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskResult> {
        self.results()
            .filter(|r| matches!(r.status, TaskStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskResult> {
        self.results()
            .filter(|r| matches!(r.status, TaskStatus::Skipped { .. }))
    }

    /// True when every task finished with `done`.
    pub fn all_done(&self) -> bool {
        self.results().all(|r| r.status.is_done())
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(0.0)
        .max(0.0)
}
