//! The task interpreter seam.
//!
//! The executor never looks inside an operation: it hands each task and
//! its dependencies' outputs to a `TaskInterpreter` and records whatever
//! comes back. `TableInterpreter` is the in-memory implementation over a
//! `Dataset`; closures work too, which is what most tests use.

mod table;

pub use table::TableInterpreter;

use crate::core::payload::Payload;
use crate::core::task::{Task, TaskId};
use crate::error::TaskExecutionError;
use indexmap::IndexMap;
use std::sync::Arc;

/// Outputs of a task's dependencies, in the task's `depends_on` order.
pub type DependencyOutputs = IndexMap<TaskId, Arc<Payload>>;

/// Executes a single task's operation.
///
/// Called from worker threads, possibly for several tasks at once, so
/// implementations must not rely on shared mutable state.
pub trait TaskInterpreter: Send + Sync {
    fn interpret(
        &self,
        task: &Task,
        inputs: &DependencyOutputs,
    ) -> Result<Payload, TaskExecutionError>;
}

impl<F> TaskInterpreter for F
where
    F: Fn(&Task, &DependencyOutputs) -> Result<Payload, TaskExecutionError> + Send + Sync,
{
    fn interpret(
        &self,
        task: &Task,
        inputs: &DependencyOutputs,
    ) -> Result<Payload, TaskExecutionError> {
        self(task, inputs)
    }
}
