//! In-memory interpreter for filter/group/aggregate/compare/fetch tasks.

use super::{DependencyOutputs, TaskInterpreter};
use crate::core::payload::{Dataset, Group, GroupSet, Payload, RowSet, Table};
use crate::core::task::{AggregateKind, Comparator, Condition, Operation, Task};
use crate::error::TaskExecutionError;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

type TaskResult<T> = std::result::Result<T, TaskExecutionError>;

/// Interprets tasks against a shared dataset.
///
/// Tasks without dependencies read the whole dataset. Row-producing
/// dependencies are intersected, so several single-condition filters
/// feeding one task behave like one filter with all the conditions.
#[derive(Debug, Clone)]
pub struct TableInterpreter {
    dataset: Arc<Dataset>,
}

impl TableInterpreter {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Rows a task operates on: the whole dataset, or the intersection of
    /// its row inputs.
    fn input_rows(&self, inputs: &DependencyOutputs) -> TaskResult<RowSet> {
        let mut rows: Option<RowSet> = None;
        for (id, payload) in inputs {
            let Payload::Rows(input) = payload.as_ref() else {
                return Err(TaskExecutionError::InvalidInput(format!(
                    "expected rows from {}, got {}",
                    id,
                    payload.kind_name()
                )));
            };
            rows = Some(match rows {
                Some(acc) => acc.intersect(input),
                None => input.clone(),
            });
        }
        Ok(rows.unwrap_or_else(|| RowSet::all(Arc::clone(&self.dataset))))
    }

    fn aggregate(
        &self,
        inputs: &DependencyOutputs,
        kind: AggregateKind,
        field: &str,
    ) -> TaskResult<Payload> {
        let groups: Vec<&GroupSet> = inputs
            .values()
            .filter_map(|p| match p.as_ref() {
                Payload::Groups(g) => Some(g),
                _ => None,
            })
            .collect();

        if groups.is_empty() {
            if inputs.len() == 1 {
                if let Some(Payload::Table(table)) = inputs.values().next().map(|p| p.as_ref()) {
                    let value = reduce_table(table, kind, field)?;
                    return scalar(value, kind, field);
                }
            }
            let rows = self.input_rows(inputs)?;
            let value = reduce_rows(&rows, rows.indices(), kind, field)?;
            return scalar(value, kind, field);
        }

        if groups.len() != inputs.len() {
            return Err(TaskExecutionError::InvalidInput(
                "cannot aggregate grouped and ungrouped inputs together".to_string(),
            ));
        }

        if let [single] = groups.as_slice() {
            let mut columns = single.keys().to_vec();
            columns.push(field.to_string());
            let mut rows = Vec::with_capacity(single.groups().len());
            for group in single.groups() {
                let value = reduce_group(single, group, kind, field)?;
                let mut row = group.key.clone();
                row.push(cell(value, kind));
                rows.push(row);
            }
            return Ok(Payload::Table(Table::new(columns, rows)));
        }

        let columns = vec![
            "dimension".to_string(),
            "group".to_string(),
            field.to_string(),
        ];
        let mut rows = Vec::new();
        for set in groups {
            let dimension = set.keys().join(",");
            for group in set.groups() {
                let value = reduce_group(set, group, kind, field)?;
                let label = group
                    .key
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join(", ");
                rows.push(vec![
                    Value::from(dimension.clone()),
                    Value::from(label),
                    cell(value, kind),
                ]);
            }
        }
        Ok(Payload::Table(Table::new(columns, rows)))
    }
}

impl TaskInterpreter for TableInterpreter {
    fn interpret(&self, task: &Task, inputs: &DependencyOutputs) -> TaskResult<Payload> {
        match &task.operation {
            Operation::Fetch => Ok(Payload::Rows(self.input_rows(inputs)?)),
            Operation::Filter { conditions } => {
                filter(self.input_rows(inputs)?, conditions).map(Payload::Rows)
            }
            Operation::Group { group_by } => {
                group(self.input_rows(inputs)?, group_by).map(Payload::Groups)
            }
            Operation::Aggregate {
                agg_type,
                agg_field,
            } => self.aggregate(inputs, *agg_type, agg_field),
            Operation::Compare {
                agg_type,
                agg_field,
            } => compare(inputs, *agg_type, agg_field),
        }
    }
}

fn column_of(source: &Dataset, name: &str) -> TaskResult<usize> {
    source
        .column_index(name)
        .ok_or_else(|| TaskExecutionError::MissingColumn(name.to_string()))
}

fn filter(rows: RowSet, conditions: &[Condition]) -> TaskResult<RowSet> {
    let source = Arc::clone(rows.source());
    let resolved = conditions
        .iter()
        .map(|c| Ok((column_of(&source, &c.field)?, c)))
        .collect::<TaskResult<Vec<_>>>()?;

    let mut kept = Vec::new();
    for &index in rows.indices() {
        let row = source.row(index);
        let mut keep = true;
        for (column, condition) in &resolved {
            if !matches(&row[*column], condition)? {
                keep = false;
                break;
            }
        }
        if keep {
            kept.push(index);
        }
    }
    Ok(RowSet::from_indices(source, kept))
}

fn matches(cell: &Value, condition: &Condition) -> TaskResult<bool> {
    let ordering = compare_values(cell, &condition.value);
    let result = match (condition.operator, ordering) {
        (Comparator::Eq, ordering) => ordering == Some(Ordering::Equal),
        (Comparator::Ne, ordering) => ordering != Some(Ordering::Equal),
        (_, None) if cell.is_null() => false,
        (op, None) => {
            return Err(TaskExecutionError::TypeMismatch {
                column: condition.field.clone(),
                detail: format!("cannot compare {} {} {}", cell, op, condition.value),
            })
        }
        (Comparator::Gt, Some(ordering)) => ordering == Ordering::Greater,
        (Comparator::Lt, Some(ordering)) => ordering == Ordering::Less,
        (Comparator::Ge, Some(ordering)) => ordering != Ordering::Less,
        (Comparator::Le, Some(ordering)) => ordering != Ordering::Greater,
    };
    Ok(result)
}

/// Ordering between two cells of the same type; `None` across types.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = compare_values(x, y).unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn group(rows: RowSet, keys: &[String]) -> TaskResult<GroupSet> {
    let source = Arc::clone(rows.source());
    let columns = keys
        .iter()
        .map(|k| column_of(&source, k))
        .collect::<TaskResult<Vec<_>>>()?;

    let mut groups: Vec<Group> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for &index in rows.indices() {
        let row = source.row(index);
        let key: Vec<Value> = columns.iter().map(|&c| row[c].clone()).collect();
        let fingerprint = Value::Array(key.clone()).to_string();
        let slot = *lookup.entry(fingerprint).or_insert_with(|| {
            groups.push(Group {
                key,
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(index);
    }
    groups.sort_by(|a, b| cmp_keys(&a.key, &b.key));

    Ok(GroupSet::new(source, keys.to_vec(), groups))
}

fn numeric(value: &Value, field: &str) -> TaskResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(TaskExecutionError::TypeMismatch {
            column: field.to_string(),
            detail: format!("expected a number, got {}", other),
        }),
    }
}

/// Non-null numeric cells; any other value is a type mismatch.
fn numbers(cells: &[&Value], field: &str) -> TaskResult<Vec<f64>> {
    let mut values = Vec::with_capacity(cells.len());
    for cell in cells {
        if let Some(v) = numeric(cell, field)? {
            values.push(v);
        }
    }
    Ok(values)
}

/// Reduce a column over a set of cells. `count` counts rows.
fn reduce<'a, I>(cells: I, kind: AggregateKind, field: &str) -> TaskResult<Option<f64>>
where
    I: IntoIterator<Item = &'a Value>,
{
    let cells: Vec<&Value> = cells.into_iter().collect();
    let result = match kind {
        AggregateKind::Count => Some(cells.len() as f64),
        AggregateKind::Sum => Some(numbers(&cells, field)?.iter().sum()),
        AggregateKind::Avg => {
            let values = numbers(&cells, field)?;
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }
        AggregateKind::Max => numbers(&cells, field)?.into_iter().reduce(f64::max),
        AggregateKind::Min => numbers(&cells, field)?.into_iter().reduce(f64::min),
    };
    Ok(result)
}

fn reduce_rows(
    rows: &RowSet,
    indices: &[usize],
    kind: AggregateKind,
    field: &str,
) -> TaskResult<Option<f64>> {
    let source = rows.source();
    let column = column_of(source, field)?;
    reduce(indices.iter().map(|&i| &source.row(i)[column]), kind, field)
}

fn reduce_group(
    set: &GroupSet,
    group: &Group,
    kind: AggregateKind,
    field: &str,
) -> TaskResult<Option<f64>> {
    let source = set.source();
    let column = column_of(source, field)?;
    reduce(group.rows.iter().map(|&i| &source.row(i)[column]), kind, field)
}

fn reduce_table(table: &Table, kind: AggregateKind, field: &str) -> TaskResult<Option<f64>> {
    let column = table
        .column(field)
        .ok_or_else(|| TaskExecutionError::MissingColumn(field.to_string()))?;
    reduce(column, kind, field)
}

fn scalar(value: Option<f64>, kind: AggregateKind, field: &str) -> TaskResult<Payload> {
    value
        .map(Payload::Scalar)
        .ok_or_else(|| TaskExecutionError::EmptyAggregate {
            agg: kind.to_string(),
            field: field.to_string(),
        })
}

fn cell(value: Option<f64>, kind: AggregateKind) -> Value {
    match (value, kind) {
        (None, _) => Value::Null,
        (Some(v), AggregateKind::Count) => Value::from(v as u64),
        (Some(v), _) => Value::from(v),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(inputs: &DependencyOutputs, kind: AggregateKind, field: &str) -> TaskResult<Payload> {
    let mut measured = Vec::with_capacity(inputs.len());
    for (id, payload) in inputs {
        let value = match payload.as_ref() {
            Payload::Scalar(v) => Some(*v),
            Payload::Rows(rows) => reduce_rows(rows, rows.indices(), kind, field)?,
            Payload::Table(table) => reduce_table(table, kind, field)?,
            Payload::Groups(_) => {
                return Err(TaskExecutionError::InvalidInput(format!(
                    "cannot compare grouped output of {}",
                    id
                )))
            }
        };
        let value = value.ok_or_else(|| TaskExecutionError::EmptyAggregate {
            agg: kind.to_string(),
            field: field.to_string(),
        })?;
        measured.push((id, value));
    }

    let baseline = measured.first().map(|(_, v)| *v).unwrap_or(0.0);
    let columns = vec![
        "task".to_string(),
        field.to_string(),
        "difference".to_string(),
    ];
    let rows = measured
        .into_iter()
        .map(|(id, v)| {
            vec![
                Value::from(id.to_string()),
                Value::from(v),
                Value::from(v - baseline),
            ]
        })
        .collect();
    Ok(Payload::Table(Table::new(columns, rows)))
}
