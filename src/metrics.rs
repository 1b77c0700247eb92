//! Performance metrics derived from an execution trace.

use crate::core::task::TaskId;
use crate::core::trace::ExecutionTrace;
use indexmap::IndexMap;
use serde::Serialize;

/// Execution times at or below this are treated as zero.
const MIN_MEASURABLE_SECS: f64 = 1e-9;

/// Figures describing how well a run used its processors.
///
/// `speedup` and `efficiency` are `None` when they cannot be computed:
/// nothing ran, or the run took no measurable time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Plan-level wall-clock seconds.
    pub execution_time: f64,
    /// Tasks handed to a worker, whether they succeeded or not.
    pub tasks_executed: usize,
    pub processors_used: usize,
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
    /// Sum of the dispatched tasks' durations.
    pub sequential_time: f64,
    /// Seconds per dispatched task, in plan order.
    pub task_times: IndexMap<TaskId, f64>,
}

impl Metrics {
    /// Multi-line report for terminals and logs.
    pub fn performance_report(&self) -> String {
        self.to_string()
    }
}

/// Derive metrics from a finished run.
pub fn report(trace: &ExecutionTrace) -> Metrics {
    let task_times: IndexMap<TaskId, f64> = trace
        .results()
        .filter(|r| r.status.was_dispatched())
        .map(|r| (r.task_id.clone(), r.duration_secs()))
        .collect();

    let execution_time = trace.elapsed_secs();
    let sequential_time: f64 = task_times.values().sum();
    let processors_used = trace.processor_count.min(trace.max_parallelism);

    let measurable = execution_time > MIN_MEASURABLE_SECS && !task_times.is_empty();
    let speedup = measurable.then(|| sequential_time / execution_time);
    let efficiency = match speedup {
        Some(s) if processors_used > 0 => Some(s / processors_used as f64),
        _ => None,
    };

    Metrics {
        execution_time,
        tasks_executed: task_times.len(),
        processors_used,
        speedup,
        efficiency,
        sequential_time,
        task_times,
    }
}

fn or_na(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| "N/A".to_string())
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Performance Report")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Execution Time:  {:.4}s", self.execution_time)?;
        writeln!(f, "Sequential Time: {:.4}s", self.sequential_time)?;
        writeln!(f, "Tasks Executed:  {}", self.tasks_executed)?;
        writeln!(f, "Processors Used: {}", self.processors_used)?;
        writeln!(f, "Speedup:         {}", or_na(self.speedup, |s| format!("{:.2}x", s)))?;
        write!(
            f,
            "Efficiency:      {}",
            or_na(self.efficiency, |e| format!("{:.1}%", e * 100.0))
        )?;
        if !self.task_times.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", "-".repeat(50))?;
            let lines: Vec<String> = self
                .task_times
                .iter()
                .map(|(id, secs)| format!("  {}: {:.4}s", id, secs))
                .collect();
            write!(f, "{}", lines.join("\n"))?;
        }
        Ok(())
    }
}
