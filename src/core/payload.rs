//! Task outputs and the dataset they are derived from.
//!
//! Row selections and groupings only hold row indices into a shared
//! `Dataset`, so handing a payload to several dependents never copies rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Serialized form of `Dataset` and `Table`; rows are normalised on the way in.
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Pad or truncate every row to `width` cells.
fn fit_rows(rows: &mut [Vec<Value>], width: usize) {
    for row in rows {
        row.resize(width, Value::Null);
    }
}

static NULL: Value = Value::Null;

/// In-memory source table: named columns and rows of JSON scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTable")]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset from column names and row-major cells.
    ///
    /// Short rows are padded with nulls, long ones truncated.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        fit_rows(&mut rows, columns.len());
        Self { columns, rows }
    }

    /// Build a dataset from JSON objects; columns are taken in first-seen order.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Parse a JSON array of objects.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let records: Vec<Map<String, Value>> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, index: usize) -> &[Value] {
        &self.rows[index]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<RawTable> for Dataset {
    fn from(raw: RawTable) -> Self {
        Self::new(raw.columns, raw.rows)
    }
}

/// A selection of dataset rows, indices ascending.
#[derive(Debug, Clone)]
pub struct RowSet {
    source: Arc<Dataset>,
    indices: Vec<usize>,
}

impl RowSet {
    /// Every row of the dataset.
    pub fn all(source: Arc<Dataset>) -> Self {
        let indices = (0..source.len()).collect();
        Self { source, indices }
    }

    pub(crate) fn from_indices(source: Arc<Dataset>, indices: Vec<usize>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { source, indices }
    }

    pub fn source(&self) -> &Arc<Dataset> {
        &self.source
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Rows present in both selections.
    pub fn intersect(&self, other: &RowSet) -> RowSet {
        let (mut i, mut j) = (0, 0);
        let mut indices = Vec::with_capacity(self.len().min(other.len()));
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    indices.push(self.indices[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        RowSet::from_indices(Arc::clone(&self.source), indices)
    }

    /// Copy the selected rows into a standalone table.
    pub fn materialize(&self) -> Table {
        Table {
            columns: self.source.columns.clone(),
            rows: self
                .indices
                .iter()
                .map(|&i| self.source.rows[i].clone())
                .collect(),
        }
    }
}

/// One group of a grouping: its key values and member rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
}

/// Rows partitioned by key columns; groups are ordered by key.
#[derive(Debug, Clone)]
pub struct GroupSet {
    source: Arc<Dataset>,
    keys: Vec<String>,
    groups: Vec<Group>,
}

impl GroupSet {
    pub(crate) fn new(source: Arc<Dataset>, keys: Vec<String>, groups: Vec<Group>) -> Self {
        Self {
            source,
            keys,
            groups,
        }
    }

    pub fn source(&self) -> &Arc<Dataset> {
        &self.source
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Key columns plus a `count` column, one row per group.
    pub fn materialize(&self) -> Table {
        let mut columns = self.keys.clone();
        columns.push("count".to_string());
        let rows = self
            .groups
            .iter()
            .map(|g| {
                let mut row = g.key.clone();
                row.push(Value::from(g.rows.len()));
                row
            })
            .collect();
        Table { columns, rows }
    }
}

/// A materialised result table.
///
/// Reads tolerate rows whose width differs from `columns`: missing cells
/// read as null and extra cells are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTable")]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table, fitting every row to the column count.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        fit_rows(&mut rows, columns.len());
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, if it exists.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(index).unwrap_or(&NULL))
                .collect(),
        )
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self, limit: usize) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    /// Stack tables, unioning their columns; missing cells become null.
    pub fn concat(tables: &[Table]) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut rows = Vec::new();
        for table in tables {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| table.column_index(c)).collect();
            for row in &table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|m| m.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                        .collect(),
                );
            }
        }
        Table { columns, rows }
    }
}

impl From<RawTable> for Table {
    fn from(raw: RawTable) -> Self {
        Self::new(raw.columns, raw.rows)
    }
}

/// The output of one task.
#[derive(Debug, Clone)]
pub enum Payload {
    Rows(RowSet),
    Groups(GroupSet),
    Table(Table),
    Scalar(f64),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Rows(_) => "rows",
            Payload::Groups(_) => "groups",
            Payload::Table(_) => "table",
            Payload::Scalar(_) => "scalar",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Payload::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Tabular view of the payload; scalars have none.
    pub fn to_table(&self) -> Option<Table> {
        match self {
            Payload::Rows(rows) => Some(rows.materialize()),
            Payload::Groups(groups) => Some(groups.materialize()),
            Payload::Table(table) => Some(table.clone()),
            Payload::Scalar(_) => None,
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "snake_case", tag = "type")]
        enum Repr<'a> {
            Table {
                columns: &'a [String],
                rows: &'a [Vec<Value>],
            },
            Scalar {
                value: f64,
            },
        }

        match self {
            Payload::Scalar(value) => Repr::Scalar { value: *value }.serialize(serializer),
            Payload::Table(table) => Repr::Table {
                columns: &table.columns,
                rows: &table.rows,
            }
            .serialize(serializer),
            other => {
                let table = other.to_table().unwrap_or_default();
                Repr::Table {
                    columns: &table.columns,
                    rows: &table.rows,
                }
                .serialize(serializer)
            }
        }
    }
}
