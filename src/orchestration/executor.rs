//! Layer-parallel executor.
//!
//! Runs an `ExecutionPlan` one layer at a time. Every task of a layer is
//! dispatched to the worker pool at once and the executor waits for all of
//! them before queueing the next layer. A failed task's dependents are
//! skipped; independent tasks keep running.

use super::pool::WorkerPool;
use super::scheduler::ExecutionPlan;
use crate::config::Config;
use crate::core::payload::Payload;
use crate::core::task::TaskId;
use crate::core::trace::{ExecutionTrace, TaskResult, TaskStatus};
use crate::interpreter::{DependencyOutputs, TaskInterpreter};
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted by the executor while a plan runs.
///
/// These let callers follow progress without polling the trace.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    /// A layer's tasks are about to be dispatched.
    LayerStarted {
        /// Zero-based layer index.
        layer: usize,
        /// Tasks in the layer, in plan order.
        tasks: Vec<TaskId>,
    },
    /// A task finished with a payload.
    TaskCompleted { task_id: TaskId },
    /// A task's interpreter call failed.
    TaskFailed { task_id: TaskId, error: String },
    /// A task was not dispatched because an ancestor failed.
    TaskSkipped {
        task_id: TaskId,
        /// The failed ancestor.
        cause: TaskId,
    },
    /// Every task of the layer is terminal.
    LayerCompleted { layer: usize },
    /// The whole plan has run.
    AllLayersComplete,
}

/// Runs execution plans against a task interpreter.
///
/// An executor holds no per-run state, so one instance can run several
/// plans, each with its own worker pool.
pub struct Executor {
    interpreter: Arc<dyn TaskInterpreter>,
    processor_count: NonZeroUsize,
    event_tx: Option<mpsc::Sender<ExecutorEvent>>,
}

impl Executor {
    pub fn new(interpreter: Arc<dyn TaskInterpreter>, processor_count: NonZeroUsize) -> Self {
        Self {
            interpreter,
            processor_count,
            event_tx: None,
        }
    }

    /// Create an executor with the processor count from a config.
    pub fn from_config(interpreter: Arc<dyn TaskInterpreter>, config: &Config) -> Self {
        let processor_count = NonZeroUsize::new(config.processor_count).unwrap_or(NonZeroUsize::MIN);
        Self::new(interpreter, processor_count)
    }

    /// Emit lifecycle events on `tx`.
    ///
    /// Events are sent without waiting; when the channel is full the event
    /// is dropped rather than stalling execution.
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// An event channel sized by `config.event_buffer`.
    pub fn event_channel(
        config: &Config,
    ) -> (mpsc::Sender<ExecutorEvent>, mpsc::Receiver<ExecutorEvent>) {
        mpsc::channel(config.event_buffer.max(1))
    }

    pub fn processor_count(&self) -> usize {
        self.processor_count.get()
    }

    fn emit(&self, event: ExecutorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }

    /// Run every layer of `plan` and return the trace.
    ///
    /// Never fails: task errors are recorded on the trace. Must be called
    /// from within a tokio runtime.
    pub async fn execute(&self, plan: &ExecutionPlan) -> ExecutionTrace {
        let pool_size = self.processor_count().min(plan.max_parallelism());
        let pool = WorkerPool::new(Arc::clone(&self.interpreter), pool_size);
        info!(
            tasks = plan.total_tasks(),
            layers = plan.total_layers(),
            workers = pool.size(),
            "executing plan"
        );

        let mut outputs: HashMap<TaskId, Arc<Payload>> = HashMap::new();
        // Failed or skipped task -> the failed task at the root of it.
        let mut blocked: HashMap<TaskId, TaskId> = HashMap::new();
        let mut layers = Vec::with_capacity(plan.total_layers());

        let started_at = Utc::now();
        for layer in plan.layers() {
            self.emit(ExecutorEvent::LayerStarted {
                layer: layer.index,
                tasks: layer.task_ids().into_iter().cloned().collect(),
            });
            debug!(layer = layer.index, tasks = layer.len(), "layer started");

            let mut slots: Vec<Option<TaskResult>> = vec![None; layer.len()];
            let mut running = FuturesUnordered::new();

            for (position, task) in layer.tasks.iter().enumerate() {
                let cause = task.depends_on.iter().find_map(|dep| blocked.get(dep));
                if let Some(cause) = cause {
                    let cause = cause.clone();
                    debug!(task = %task.id, cause = %cause, "task skipped");
                    self.emit(ExecutorEvent::TaskSkipped {
                        task_id: task.id.clone(),
                        cause: cause.clone(),
                    });
                    slots[position] = Some(TaskResult::skipped(task.id.clone(), cause));
                    continue;
                }

                let inputs: DependencyOutputs = task
                    .depends_on
                    .iter()
                    .filter_map(|dep| outputs.get(dep).map(|p| (dep.clone(), Arc::clone(p))))
                    .collect();
                let pool = &pool;
                let task = Arc::clone(task);
                running.push(async move { (position, pool.run(task, inputs).await) });
            }

            // Barrier: the next layer waits for every dispatched task.
            while let Some((position, result)) = running.next().await {
                match &result.status {
                    TaskStatus::Done => {
                        if let Some(payload) = &result.payload {
                            outputs.insert(result.task_id.clone(), Arc::clone(payload));
                        }
                        self.emit(ExecutorEvent::TaskCompleted {
                            task_id: result.task_id.clone(),
                        });
                    }
                    TaskStatus::Failed { error } => {
                        self.emit(ExecutorEvent::TaskFailed {
                            task_id: result.task_id.clone(),
                            error: error.clone(),
                        });
                    }
                    TaskStatus::Skipped { .. } => {}
                }
                slots[position] = Some(result);
            }

            let results: Vec<TaskResult> = slots.into_iter().flatten().collect();
            for result in &results {
                match &result.status {
                    TaskStatus::Failed { .. } => {
                        blocked.insert(result.task_id.clone(), result.task_id.clone());
                    }
                    TaskStatus::Skipped { cause } => {
                        blocked.insert(result.task_id.clone(), cause.clone());
                    }
                    TaskStatus::Done => {}
                }
            }

            debug!(layer = layer.index, "layer completed");
            self.emit(ExecutorEvent::LayerCompleted { layer: layer.index });
            layers.push(results);
        }
        let finished_at = Utc::now();

        if !blocked.is_empty() {
            warn!(
                failed_or_skipped = blocked.len(),
                "plan finished with failures"
            );
        }
        self.emit(ExecutorEvent::AllLayersComplete);

        ExecutionTrace {
            layers,
            processor_count: self.processor_count(),
            max_parallelism: plan.max_parallelism(),
            started_at,
            finished_at,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("processor_count", &self.processor_count)
            .field("events", &self.event_tx.is_some())
            .finish()
    }
}
