//! Task graph for dependency management.
//!
//! `TaskGraph` holds the tasks of one query as nodes of a petgraph `DiGraph`
//! with an edge from every dependency to its dependent. Node indices follow
//! submission order, which is what keeps leveling deterministic.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The validated dependency graph of a query.
///
/// Every dependency refers to a task in the graph and the dependency
/// relation is acyclic. Tasks are never modified after `build`.
#[derive(Clone)]
pub struct TaskGraph {
    /// The underlying directed graph; edges point from dependency to dependent.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build and validate the graph for a list of tasks.
    ///
    /// # Errors
    /// - `DuplicateTask` if two tasks share an id
    /// - `InvalidParameters` if a task's operation parameters are malformed
    /// - `UnknownDependency` if a task depends on an id that was not submitted
    /// - `CyclicDependency` if leveling cannot place every task
    pub fn build(tasks: Vec<Task>) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut task_index = HashMap::with_capacity(tasks.len());

        for mut task in tasks {
            if task_index.contains_key(&task.id) {
                return Err(Error::DuplicateTask(task.id));
            }

            // Repeated dependencies would count twice towards the in-degree.
            let mut seen = HashSet::new();
            task.depends_on.retain(|dep| seen.insert(dep.clone()));

            task.validate().map_err(|reason| Error::InvalidParameters {
                task_id: task.id.clone(),
                reason,
            })?;

            let id = task.id.clone();
            let index = graph.add_node(task);
            task_index.insert(id, index);
        }

        let mut edges = Vec::new();
        for index in graph.node_indices() {
            let task = &graph[index];
            for dep in &task.depends_on {
                let dep_index =
                    task_index
                        .get(dep)
                        .ok_or_else(|| Error::UnknownDependency {
                            task_id: task.id.clone(),
                            missing: dep.clone(),
                        })?;
                edges.push((*dep_index, index));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        let dag = Self { graph, task_index };
        dag.levels()?;

        debug!(
            tasks = dag.task_count(),
            dependencies = dag.dependency_count(),
            "task graph built"
        );
        Ok(dag)
    }

    /// Level the graph into layers of node indices (Kahn's algorithm).
    ///
    /// Layer 0 holds the tasks without dependencies; every other task lands
    /// one layer after its deepest dependency. Within a layer nodes are in
    /// submission order.
    ///
    /// # Errors
    /// Returns `CyclicDependency` with the unplaced tasks, in submission
    /// order, when a round places nothing while tasks remain.
    pub(crate) fn levels(&self) -> Result<Vec<Vec<NodeIndex>>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .collect();

        let mut layers = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for &index in &current {
                for dependent in self.graph.neighbors_directed(index, Direction::Outgoing) {
                    let degree = &mut in_degree[dependent.index()];
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            layers.push(std::mem::replace(&mut current, next));
        }

        if placed < self.task_count() {
            let cycle = self
                .graph
                .node_indices()
                .filter(|index| in_degree[index.index()] > 0)
                .map(|index| self.graph[index].id.clone())
                .collect();
            return Err(Error::CyclicDependency { cycle });
        }

        Ok(layers)
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get the NodeIndex for a task by its ID.
    pub fn get_node_index(&self, id: &TaskId) -> Option<NodeIndex> {
        self.task_index.get(id).copied()
    }

    pub(crate) fn task_at(&self, index: NodeIndex) -> &Task {
        &self.graph[index]
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if `to` directly depends on `from`.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.task_index.get(from), self.task_index.get(to))
        {
            self.graph.find_edge(from_idx, to_idx).is_some()
        } else {
            false
        }
    }

    /// Get all tasks the given task depends on, in declaration order.
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        self.get_task(id)
            .map(|task| {
                task.depends_on
                    .iter()
                    .filter_map(|dep| self.get_task(dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all tasks that directly depend on the given task, in submission order.
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        dependents.sort_unstable();
        dependents
            .into_iter()
            .map(|neighbor| &self.graph[neighbor])
            .collect()
    }

    /// Whether no task depends on the given task.
    pub fn is_terminal(&self, id: &TaskId) -> bool {
        self.task_index.get(id).is_some_and(|&index| {
            self.graph
                .neighbors_directed(index, Direction::Outgoing)
                .next()
                .is_none()
        })
    }

    /// All tasks in submission order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Get the underlying graph for advanced operations.
    pub fn graph(&self) -> &DiGraph<Task, ()> {
        &self.graph
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
