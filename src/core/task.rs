//! Task data model for the execution graph.
//!
//! A task is one operation of a decomposed query. Its parameters are a
//! tagged variant per operation kind so malformed parameters are rejected
//! when the graph is built, not when the task runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied identifier of a task, unique within one query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
        }
    }

    /// Whether the operator needs an ordering rather than just equality.
    pub fn is_ordering(&self) -> bool {
        !matches!(self, Comparator::Eq | Comparator::Ne)
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `field <op> value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Comparator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// Aggregation function applied to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Sum,
    #[serde(alias = "mean")]
    Avg,
    Count,
    Max,
    Min,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Count => "count",
            AggregateKind::Max => "max",
            AggregateKind::Min => "min",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation kind without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Filter,
    Group,
    Aggregate,
    Compare,
    Fetch,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Filter => "filter",
            OperationKind::Group => "group",
            OperationKind::Aggregate => "aggregate",
            OperationKind::Compare => "compare",
            OperationKind::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// An operation together with its kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum Operation {
    /// Keep the rows matching every condition.
    Filter { conditions: Vec<Condition> },
    /// Partition rows by the given key columns.
    Group { group_by: Vec<String> },
    /// Reduce a numeric field, per group when the input is grouped.
    Aggregate {
        agg_type: AggregateKind,
        agg_field: String,
    },
    /// Line up the aggregated field of each dependency's output.
    Compare {
        agg_type: AggregateKind,
        agg_field: String,
    },
    /// Pass rows through unchanged.
    Fetch,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Filter { .. } => OperationKind::Filter,
            Operation::Group { .. } => OperationKind::Group,
            Operation::Aggregate { .. } => OperationKind::Aggregate,
            Operation::Compare { .. } => OperationKind::Compare,
            Operation::Fetch => OperationKind::Fetch,
        }
    }

    /// Short human-readable rendering of the parameters.
    pub fn describe(&self) -> String {
        match self {
            Operation::Filter { conditions } => conditions
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" and "),
            Operation::Group { group_by } => format!("by {}", group_by.join(", ")),
            Operation::Aggregate {
                agg_type,
                agg_field,
            } => format!("{}({})", agg_type, agg_field),
            Operation::Compare {
                agg_type,
                agg_field,
            } => format!("compare {}({})", agg_type, agg_field),
            Operation::Fetch => "all rows".to_string(),
        }
    }
}

/// A single task of a decomposed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    #[serde(flatten)]
    pub operation: Operation,
    /// Tasks whose outputs this task consumes, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            depends_on: Vec::new(),
        }
    }

    /// Declare the tasks this task depends on.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }

    /// Check the operation parameters, returning the reason they are malformed.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match &self.operation {
            Operation::Filter { conditions } => {
                if conditions.is_empty() {
                    return Err("filter needs at least one condition".to_string());
                }
                if let Some(c) = conditions.iter().find(|c| c.field.trim().is_empty()) {
                    return Err(format!("filter condition on empty field ({})", c));
                }
                if let Some(c) = conditions
                    .iter()
                    .find(|c| c.operator.is_ordering() && !is_orderable(&c.value))
                {
                    return Err(format!("operator {} needs a number or string", c.operator));
                }
                Ok(())
            }
            Operation::Group { group_by } => {
                if group_by.is_empty() {
                    return Err("group needs at least one key column".to_string());
                }
                if group_by.iter().any(|k| k.trim().is_empty()) {
                    return Err("group key column is empty".to_string());
                }
                Ok(())
            }
            Operation::Aggregate { agg_field, .. } => {
                if agg_field.trim().is_empty() {
                    return Err("aggregate field is empty".to_string());
                }
                Ok(())
            }
            Operation::Compare { agg_field, .. } => {
                if agg_field.trim().is_empty() {
                    return Err("compare field is empty".to_string());
                }
                if self.depends_on.len() < 2 {
                    return Err("compare needs at least two dependencies".to_string());
                }
                Ok(())
            }
            Operation::Fetch => Ok(()),
        }
    }
}

fn is_orderable(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_))
}
