//! Core domain models for query execution.
//!
//! This module contains the fundamental data structures used throughout
//! the crate: tasks, the validated task graph, payloads and the
//! execution trace.

pub mod dag;
pub mod payload;
pub mod task;
pub mod trace;

pub use dag::TaskGraph;
pub use payload::{Dataset, Payload, Table};
pub use task::{AggregateKind, Comparator, Condition, Operation, OperationKind, Task, TaskId};
pub use trace::{ExecutionTrace, TaskResult, TaskStatus};
