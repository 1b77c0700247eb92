//! Merges terminal task outputs and formats the final query response.

use crate::config::{Config, DEFAULT_MAX_DISPLAY_ROWS};
use crate::core::payload::{Payload, Table};
use crate::core::task::TaskId;
use crate::core::trace::{ExecutionTrace, TaskResult, TaskStatus};
use crate::metrics::Metrics;
use crate::orchestration::ExecutionPlan;
use crate::Result;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplaySummary {
    pub total_rows: usize,
    pub displayed_rows: usize,
    pub truncated: bool,
}

/// Statistics of a numeric column, ignoring nulls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// The user-facing form of a query's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FormattedResult {
    Table {
        shape: Shape,
        columns: Vec<String>,
        /// The first rows, as records.
        data: Vec<Map<String, Value>>,
        summary: DisplaySummary,
        #[serde(skip_serializing_if = "IndexMap::is_empty")]
        statistics: IndexMap<String, ColumnStats>,
    },
    Scalar {
        value: f64,
        formatted_value: String,
    },
    /// No terminal task produced output.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionMetadata {
    /// Seconds, rounded to 4 decimals.
    pub total_execution_time: f64,
    pub processors_used: usize,
    pub task_execution_times: IndexMap<TaskId, f64>,
}

/// Everything reported back for one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub result: FormattedResult,
    pub execution_metadata: ExecutionMetadata,
    pub metrics: Metrics,
    pub status: ResponseStatus,
    /// Failed and skipped tasks, in plan order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_tasks: Vec<TaskId>,
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary of the response.
    pub fn summary(&self) -> String {
        let mut out = format!("Query: {}\n{}\n\n", self.query, "=".repeat(70));

        match &self.result {
            FormattedResult::Table {
                columns,
                data,
                summary,
                statistics,
                ..
            } => {
                out.push_str("Result Type: Table\n");
                out.push_str(&format!("Total Rows: {}\n", summary.total_rows));
                out.push_str(&format!("Columns: {}\n\n", columns.join(", ")));
                out.push_str("Data Preview:\n");
                out.push_str(&format!("{}\n", "-".repeat(70)));
                out.push_str(&render_records(columns, data));
                if summary.truncated {
                    out.push_str(&format!(
                        "\n... (showing {} of {} rows)",
                        summary.displayed_rows, summary.total_rows
                    ));
                }
                if !statistics.is_empty() {
                    out.push_str(&format!("\n\nStatistics:\n{}\n", "-".repeat(70)));
                    for (column, stats) in statistics {
                        out.push_str(&format!("\n{}:\n", column));
                        out.push_str(&format!("  Sum: {}\n", thousands(stats.sum)));
                        out.push_str(&format!("  Average: {}\n", thousands(stats.mean)));
                        out.push_str(&format!("  Min: {}\n", thousands(stats.min)));
                        out.push_str(&format!("  Max: {}\n", thousands(stats.max)));
                    }
                }
            }
            FormattedResult::Scalar {
                formatted_value, ..
            } => {
                out.push_str(&format!("Result: {}\n", formatted_value));
            }
            FormattedResult::Empty => out.push_str("Result: (no data)\n"),
        }

        if !self.failed_tasks.is_empty() {
            let ids: Vec<&str> = self.failed_tasks.iter().map(|t| t.as_str()).collect();
            out.push_str(&format!("\nFailed Tasks: {}\n", ids.join(", ")));
        }

        out.push_str(&format!("\n{}\n", "=".repeat(70)));
        out.push_str(&format!(
            "Execution Time: {}s\n",
            self.execution_metadata.total_execution_time
        ));
        out.push_str(&format!(
            "Processors Used: {}\n",
            self.execution_metadata.processors_used
        ));
        out
    }
}

/// Results of the plan's terminal tasks, in submission order.
pub fn terminal_results(plan: &ExecutionPlan, trace: &ExecutionTrace) -> IndexMap<TaskId, TaskResult> {
    plan.terminal_tasks()
        .iter()
        .filter_map(|id| trace.get(id).map(|r| (id.clone(), r.clone())))
        .collect()
}

/// Merges and formats terminal task outputs.
#[derive(Debug, Clone)]
pub struct Aggregator {
    max_display_rows: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISPLAY_ROWS)
    }
}

impl Aggregator {
    pub fn new(max_display_rows: usize) -> Self {
        Self {
            max_display_rows: max_display_rows.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_display_rows)
    }

    /// Combine several outputs into one.
    ///
    /// A single output is returned as-is. Several scalars become a
    /// `task`/`value` table; anything else is stacked into one table.
    pub fn merge(&self, outputs: &IndexMap<TaskId, Arc<Payload>>) -> Option<Payload> {
        if outputs.len() <= 1 {
            return outputs.values().next().map(|p| p.as_ref().clone());
        }

        let tables: Vec<Table> = outputs
            .iter()
            .map(|(id, payload)| match payload.as_ref() {
                Payload::Scalar(v) => scalar_row(id, *v),
                other => other.to_table().unwrap_or_default(),
            })
            .collect();
        Some(Payload::Table(Table::concat(&tables)))
    }

    pub fn format(&self, payload: Option<&Payload>) -> FormattedResult {
        match payload {
            None => FormattedResult::Empty,
            Some(Payload::Scalar(value)) => FormattedResult::Scalar {
                value: *value,
                formatted_value: thousands(*value),
            },
            Some(other) => self.format_table(&other.to_table().unwrap_or_default()),
        }
    }

    fn format_table(&self, table: &Table) -> FormattedResult {
        let data = table.records(self.max_display_rows);
        let statistics = table
            .columns
            .iter()
            .filter_map(|c| column_stats(table, c).map(|s| (c.clone(), s)))
            .collect();

        FormattedResult::Table {
            shape: Shape {
                rows: table.len(),
                columns: table.columns.len(),
            },
            columns: table.columns.clone(),
            summary: DisplaySummary {
                total_rows: table.len(),
                displayed_rows: data.len(),
                truncated: table.len() > self.max_display_rows,
            },
            data,
            statistics,
        }
    }

    /// Build the response for a finished run.
    ///
    /// The status is `success` only when every terminal task is done.
    pub fn respond(
        &self,
        query: &str,
        terminal: &IndexMap<TaskId, TaskResult>,
        trace: &ExecutionTrace,
        metrics: &Metrics,
    ) -> QueryResponse {
        let outputs: IndexMap<TaskId, Arc<Payload>> = terminal
            .iter()
            .filter_map(|(id, r)| r.payload.as_ref().map(|p| (id.clone(), Arc::clone(p))))
            .collect();
        let merged = self.merge(&outputs);

        let all_done = terminal.values().all(|r| r.status == TaskStatus::Done);
        let failed_tasks = trace
            .results()
            .filter(|r| !r.status.is_done())
            .map(|r| r.task_id.clone())
            .collect();

        QueryResponse {
            query: query.to_string(),
            result: self.format(merged.as_ref()),
            execution_metadata: ExecutionMetadata {
                total_execution_time: round4(metrics.execution_time),
                processors_used: metrics.processors_used,
                task_execution_times: metrics
                    .task_times
                    .iter()
                    .map(|(id, t)| (id.clone(), round4(*t)))
                    .collect(),
            },
            metrics: metrics.clone(),
            status: if all_done {
                ResponseStatus::Success
            } else {
                ResponseStatus::Failed
            },
            failed_tasks,
        }
    }
}

fn scalar_row(id: &TaskId, value: f64) -> Table {
    Table::new(
        vec!["task".to_string(), "value".to_string()],
        vec![vec![Value::from(id.to_string()), Value::from(value)]],
    )
}

/// Stats for a column whose non-null cells are all numbers.
fn column_stats(table: &Table, column: &str) -> Option<ColumnStats> {
    let cells = table.column(column)?;
    let mut values = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell {
            Value::Null => {}
            Value::Number(n) => values.push(n.as_f64()?),
            _ => return None,
        }
    }
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(ColumnStats {
        sum,
        mean: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        count: values.len(),
    })
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Two decimals with thousands separators, e.g. `1,234,567.89`.
fn thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_records(columns: &[String], data: &[Map<String, Value>]) -> String {
    let cells: Vec<Vec<String>> = data
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| record.get(c).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:>width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut lines = vec![line(columns.iter().map(String::as_str).collect())];
    for row in &cells {
        lines.push(line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}
