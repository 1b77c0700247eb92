//! Layer scheduler: turns a task graph into an execution plan.
//!
//! A plan is the graph leveled into layers. Every task of a layer depends
//! only on tasks of earlier layers, so a whole layer can run at once and
//! the executor only has to wait between layers.

use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId};
use crate::error::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tasks at the same dependency depth, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    /// Zero-based position of the layer in the plan.
    pub index: usize,
    pub tasks: Vec<Arc<Task>>,
}

impl Layer {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether more than one task runs in this layer.
    pub fn can_parallel(&self) -> bool {
        self.tasks.len() > 1
    }

    pub fn task_ids(&self) -> Vec<&TaskId> {
        self.tasks.iter().map(|t| &t.id).collect()
    }
}

/// Ordered layers of a query plus the figures derived from them.
///
/// The summary figures are computed once when the plan is created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    layers: Vec<Layer>,
    total_tasks: usize,
    total_layers: usize,
    max_parallelism: usize,
    /// Tasks nothing depends on, in submission order.
    terminal_tasks: Vec<TaskId>,
    #[serde(skip)]
    layer_of: HashMap<TaskId, usize>,
}

impl ExecutionPlan {
    fn new(layers: Vec<Layer>, terminal_tasks: Vec<TaskId>) -> Self {
        let layer_of = layers
            .iter()
            .flat_map(|layer| layer.tasks.iter().map(move |t| (t.id.clone(), layer.index)))
            .collect();
        Self {
            total_tasks: layers.iter().map(Layer::len).sum(),
            total_layers: layers.len(),
            max_parallelism: layers.iter().map(Layer::len).max().unwrap_or(0),
            layers,
            terminal_tasks,
            layer_of,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    pub fn total_layers(&self) -> usize {
        self.total_layers
    }

    /// Size of the largest layer.
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub fn terminal_tasks(&self) -> &[TaskId] {
        &self.terminal_tasks
    }

    /// Layer index of a task, if it is part of the plan.
    pub fn layer_of(&self, id: &TaskId) -> Option<usize> {
        self.layer_of.get(id).copied()
    }

    /// Task ids per layer, for display and comparison.
    pub fn layer_ids(&self) -> Vec<Vec<String>> {
        self.layers
            .iter()
            .map(|layer| layer.tasks.iter().map(|t| t.id.to_string()).collect())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Task Execution DAG:")?;
        writeln!(f, "{}", "=".repeat(50))?;
        for layer in &self.layers {
            writeln!(
                f,
                "Layer {} (Parallel: {}, Tasks: {})",
                layer.index + 1,
                layer.can_parallel(),
                layer.len()
            )?;
            writeln!(f, "{}", "-".repeat(50))?;
            for task in &layer.tasks {
                writeln!(
                    f,
                    "  [{}] {}: {}",
                    task.id,
                    task.kind(),
                    task.operation.describe()
                )?;
                if task.has_dependencies() {
                    let deps: Vec<&str> = task.depends_on.iter().map(|d| d.as_str()).collect();
                    writeln!(f, "    Depends on: {}", deps.join(", "))?;
                }
            }
            writeln!(f)?;
        }
        write!(
            f,
            "Total Tasks: {} | Layers: {} | Max Parallel Tasks: {}",
            self.total_tasks, self.total_layers, self.max_parallelism
        )
    }
}

/// Levels task graphs into execution plans.
///
/// Planning never mutates the graph and is deterministic: the same graph
/// always yields the same layers in the same order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayerScheduler;

impl LayerScheduler {
    /// Derive the execution plan of a graph.
    ///
    /// # Errors
    /// Returns `CyclicDependency` if the graph cannot be fully leveled.
    pub fn plan(graph: &TaskGraph) -> Result<ExecutionPlan> {
        let levels = graph.levels()?;

        let layers: Vec<Layer> = levels
            .into_iter()
            .enumerate()
            .map(|(index, nodes)| Layer {
                index,
                tasks: nodes
                    .into_iter()
                    .map(|node| Arc::new(graph.task_at(node).clone()))
                    .collect(),
            })
            .collect();

        let terminal_tasks = graph
            .all_tasks()
            .into_iter()
            .filter(|t| graph.is_terminal(&t.id))
            .map(|t| t.id.clone())
            .collect();

        let plan = ExecutionPlan::new(layers, terminal_tasks);
        debug!(
            tasks = plan.total_tasks(),
            layers = plan.total_layers(),
            max_parallelism = plan.max_parallelism(),
            "execution plan created"
        );
        Ok(plan)
    }
}
