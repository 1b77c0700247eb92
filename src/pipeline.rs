//! End-to-end query run: build, plan, execute, report.

use crate::aggregator::{self, Aggregator, QueryResponse};
use crate::config::Config;
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId};
use crate::core::trace::{ExecutionTrace, TaskResult, TaskStatus};
use crate::interpreter::TaskInterpreter;
use crate::log;
use crate::metrics::{self, Metrics};
use crate::orchestration::{ExecutionPlan, Executor, LayerScheduler};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;

/// Everything produced by one run.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub graph: TaskGraph,
    pub plan: ExecutionPlan,
    pub trace: ExecutionTrace,
    pub metrics: Metrics,
    /// Results of the terminal tasks, in submission order.
    pub terminal: IndexMap<TaskId, TaskResult>,
}

impl QueryOutcome {
    /// Whether every terminal task is done.
    pub fn is_success(&self) -> bool {
        self.terminal.values().all(|r| r.status == TaskStatus::Done)
    }

    pub fn respond(&self, query: &str, aggregator: &Aggregator) -> QueryResponse {
        aggregator.respond(query, &self.terminal, &self.trace, &self.metrics)
    }
}

/// Parse a decomposed query: a JSON array of task records.
pub fn parse_tasks(json: &str) -> Result<Vec<Task>> {
    Ok(serde_json::from_str(json)?)
}

/// Run a task list end to end.
///
/// Graph errors abort before anything executes; task failures are
/// recorded on the trace instead.
pub async fn run_query(
    tasks: Vec<Task>,
    interpreter: Arc<dyn TaskInterpreter>,
    processor_count: usize,
) -> Result<QueryOutcome> {
    let processor_count = NonZeroUsize::new(processor_count).ok_or_else(|| {
        Error::InvalidConfig("processor_count must be at least 1".to_string())
    })?;
    run(tasks, Executor::new(interpreter, processor_count)).await
}

/// Run a task list with the processor count from `config`.
///
/// Also installs the log subscriber, honouring `config.debug`, unless one
/// is already set.
pub async fn run_query_with_config(
    tasks: Vec<Task>,
    interpreter: Arc<dyn TaskInterpreter>,
    config: &Config,
) -> Result<QueryOutcome> {
    config.validate()?;
    log::init_from_config(config);
    run(tasks, Executor::from_config(interpreter, config)).await
}

async fn run(tasks: Vec<Task>, executor: Executor) -> Result<QueryOutcome> {
    let graph = TaskGraph::build(tasks)?;
    let plan = LayerScheduler::plan(&graph)?;
    let trace = executor.execute(&plan).await;
    let metrics = metrics::report(&trace);
    let terminal = aggregator::terminal_results(&plan, &trace);

    info!(
        tasks = plan.total_tasks(),
        layers = plan.total_layers(),
        execution_time = metrics.execution_time,
        failed = trace.failed().count(),
        "query finished"
    );

    Ok(QueryOutcome {
        graph,
        plan,
        trace,
        metrics,
        terminal,
    })
}
