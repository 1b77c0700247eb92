pub mod aggregator;
pub mod config;
pub mod core;
pub mod error;
pub mod interpreter;
pub mod log;
pub mod metrics;
pub mod orchestration;
pub mod pipeline;

pub use crate::core::{
    Dataset, ExecutionTrace, Operation, OperationKind, Payload, Table, Task, TaskGraph, TaskId,
    TaskResult, TaskStatus,
};
pub use aggregator::{Aggregator, FormattedResult, QueryResponse};
pub use config::Config;
pub use error::{Error, Result, TaskExecutionError};
pub use interpreter::{DependencyOutputs, TableInterpreter, TaskInterpreter};
pub use metrics::Metrics;
pub use orchestration::{ExecutionPlan, Executor, ExecutorEvent, LayerScheduler};
pub use pipeline::{run_query, QueryOutcome};
