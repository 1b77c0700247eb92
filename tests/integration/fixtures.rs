//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Predefined task sets (chain, independent, diamond)
//! - Interpreters that sleep, fail or record what they run
//! - A small sales dataset

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qpar::core::task::{Operation, Task, TaskId};
use qpar::core::{Dataset, Payload};
use qpar::interpreter::{DependencyOutputs, TaskInterpreter};
use qpar::orchestration::{ExecutionPlan, LayerScheduler};
use qpar::{TaskExecutionError, TaskGraph};

/// A fetch task with the given dependencies.
pub fn task(id: &str, deps: &[&str]) -> Task {
    Task::new(id, Operation::Fetch).with_dependencies(deps.iter().copied())
}

/// T1 <- T2 <- ... <- Tn.
pub fn chain_tasks(count: usize) -> Vec<Task> {
    (1..=count)
        .map(|i| {
            let id = format!("T{}", i);
            if i == 1 {
                task(&id, &[])
            } else {
                task(&id, &[format!("T{}", i - 1).as_str()])
            }
        })
        .collect()
}

/// T1..Tn with no dependencies.
pub fn independent_tasks(count: usize) -> Vec<Task> {
    (1..=count).map(|i| task(&format!("T{}", i), &[])).collect()
}

/// T1, T2; T3 <- T1; T4 <- T2; T5 <- T3, T4.
pub fn diamond_tasks() -> Vec<Task> {
    vec![
        task("T1", &[]),
        task("T2", &[]),
        task("T3", &["T1"]),
        task("T4", &["T2"]),
        task("T5", &["T3", "T4"]),
    ]
}

pub fn plan_of(tasks: Vec<Task>) -> ExecutionPlan {
    let graph = TaskGraph::build(tasks).expect("Failed to build graph");
    LayerScheduler::plan(&graph).expect("Failed to plan graph")
}

pub fn procs(count: usize) -> NonZeroUsize {
    NonZeroUsize::new(count).expect("processor count must be positive")
}

/// Sleeps for `delay`, then returns 1 plus the sum of scalar inputs.
pub fn sleeping_interpreter(delay: Duration) -> Arc<dyn TaskInterpreter> {
    Arc::new(
        move |_: &Task, inputs: &DependencyOutputs| -> Result<Payload, TaskExecutionError> {
            std::thread::sleep(delay);
            let sum: f64 = inputs.values().filter_map(|p| p.as_scalar()).sum();
            Ok(Payload::Scalar(sum + 1.0))
        },
    )
}

/// Fails the listed tasks, succeeds on everything else.
pub fn failing_interpreter(failing: &[&str]) -> Arc<dyn TaskInterpreter> {
    let failing: HashSet<TaskId> = failing.iter().map(|id| TaskId::from(*id)).collect();
    Arc::new(
        move |task: &Task, _: &DependencyOutputs| -> Result<Payload, TaskExecutionError> {
            if failing.contains(&task.id) {
                Err(TaskExecutionError::from(format!("{} exploded", task.id)))
            } else {
                Ok(Payload::Scalar(1.0))
            }
        },
    )
}

/// What a recording interpreter saw, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    End(String),
}

/// An interpreter that sleeps and records starts, ends and peak concurrency.
pub struct RecordingInterpreter {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    log: Mutex<Vec<Call>>,
}

impl RecordingInterpreter {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Call> {
        self.log.lock().expect("call log poisoned").clone()
    }

    /// Position of the first matching entry in the log.
    pub fn position(&self, call: &Call) -> usize {
        self.log()
            .iter()
            .position(|p| p == call)
            .unwrap_or_else(|| panic!("{:?} not in call log", call))
    }
}

impl TaskInterpreter for RecordingInterpreter {
    fn interpret(
        &self,
        task: &Task,
        _inputs: &DependencyOutputs,
    ) -> Result<Payload, TaskExecutionError> {
        self.log
            .lock()
            .expect("call log poisoned")
            .push(Call::Start(task.id.to_string()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        std::thread::sleep(self.delay);

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.log
            .lock()
            .expect("call log poisoned")
            .push(Call::End(task.id.to_string()));
        Ok(Payload::Scalar(0.0))
    }
}

/// Ten sales rows across three regions and two years.
pub fn sales_dataset() -> Arc<Dataset> {
    let json = r#"[
        {"region": "North", "year": 2022, "product": "Laptop", "sales": 1200.0, "discount": 0.10},
        {"region": "North", "year": 2023, "product": "Phone",  "sales": 800.0,  "discount": 0.05},
        {"region": "North", "year": 2023, "product": "Laptop", "sales": 1500.0, "discount": 0.25},
        {"region": "South", "year": 2022, "product": "Tablet", "sales": 400.0,  "discount": 0.00},
        {"region": "South", "year": 2023, "product": "Phone",  "sales": 950.0,  "discount": 0.15},
        {"region": "South", "year": 2023, "product": "Tablet", "sales": 300.0,  "discount": 0.30},
        {"region": "East",  "year": 2022, "product": "Phone",  "sales": 700.0,  "discount": 0.10},
        {"region": "East",  "year": 2023, "product": "Laptop", "sales": 2100.0, "discount": 0.05},
        {"region": "East",  "year": 2023, "product": "Phone",  "sales": 650.0,  "discount": 0.20},
        {"region": "East",  "year": 2022, "product": "Tablet", "sales": 500.0,  "discount": 0.00}
    ]"#;
    Arc::new(Dataset::from_json(json).expect("Failed to parse sales dataset"))
}
