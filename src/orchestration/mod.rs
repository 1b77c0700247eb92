//! Orchestration layer: planning and running task graphs.
//!
//! `LayerScheduler` levels a graph into an `ExecutionPlan`; the `Executor`
//! runs the plan layer by layer on a bounded `WorkerPool`.

mod executor;
mod pool;
pub mod scheduler;

pub use executor::{Executor, ExecutorEvent};
pub use pool::WorkerPool;
pub use scheduler::{ExecutionPlan, Layer, LayerScheduler};
