//! Worker pool for interpreter calls.
//!
//! The `WorkerPool` bounds how many tasks run at once. Each dispatched task
//! waits for a permit, then runs on tokio's blocking pool so CPU-bound
//! interpreters never stall the runtime. The pool's size is fixed when it
//! is created.

use crate::core::task::Task;
use crate::core::trace::TaskResult;
use crate::error::TaskExecutionError;
use crate::interpreter::{DependencyOutputs, TaskInterpreter};
use chrono::Utc;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// A bounded set of workers feeding tasks to one interpreter.
pub struct WorkerPool {
    interpreter: Arc<dyn TaskInterpreter>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks at once (at least one).
    pub fn new(interpreter: Arc<dyn TaskInterpreter>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            interpreter,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently idle.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one task on a worker and record its outcome.
    ///
    /// Never fails: interpreter errors and panics become `failed` results.
    /// Timestamps are taken immediately around the interpreter call.
    pub async fn run(&self, task: Arc<Task>, inputs: DependencyOutputs) -> TaskResult {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let now = Utc::now();
                return TaskResult::failed(
                    task.id.clone(),
                    "worker pool closed".to_string(),
                    now,
                    now,
                );
            }
        };

        let interpreter = Arc::clone(&self.interpreter);
        let job_task = Arc::clone(&task);
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let started = Utc::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                interpreter.interpret(&job_task, &inputs)
            }));
            let finished = Utc::now();
            (started, outcome, finished)
        })
        .await;

        let (started, outcome, finished) = match joined {
            Ok(parts) => parts,
            Err(e) => {
                let now = Utc::now();
                warn!(task = %task.id, error = %e, "worker join failed");
                return TaskResult::failed(task.id.clone(), e.to_string(), now, now);
            }
        };

        let outcome = outcome.unwrap_or_else(|panic| {
            Err(TaskExecutionError::Panicked(panic_message(panic.as_ref())))
        });

        match outcome {
            Ok(payload) => {
                debug!(task = %task.id, kind = payload.kind_name(), "task done");
                TaskResult::done(task.id.clone(), payload, started, finished)
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "task failed");
                TaskResult::failed(task.id.clone(), e.to_string(), started, finished)
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "interpreter panicked".to_string()
    }
}
