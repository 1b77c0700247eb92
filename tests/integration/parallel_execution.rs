//! Parallel execution correctness tests.
//!
//! These tests verify layer barriers, the worker bound and that failures
//! only affect their own dependents.

use std::sync::Arc;
use std::time::Duration;

use qpar::core::task::TaskId;
use qpar::core::TaskStatus;
use qpar::interpreter::TaskInterpreter;
use qpar::orchestration::{Executor, ExecutorEvent};
use tokio::sync::mpsc;

use crate::fixtures::{
    diamond_tasks, failing_interpreter, independent_tasks, plan_of, procs, task, Call,
    RecordingInterpreter,
};

fn status(trace: &qpar::ExecutionTrace, id: &str) -> TaskStatus {
    trace
        .get(&TaskId::from(id))
        .unwrap_or_else(|| panic!("{} missing from trace", id))
        .status
        .clone()
}

/// Test: Layer barrier
/// Given the diamond graph
/// When it runs with plenty of workers
/// Then no task of a layer starts before every task of the previous layer ended
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_layers_are_separated_by_barriers() {
    let recorder = RecordingInterpreter::new(Duration::from_millis(20));
    let executor = Executor::new(recorder.clone() as Arc<dyn TaskInterpreter>, procs(8));
    let plan = plan_of(diamond_tasks());

    let trace = executor.execute(&plan).await;
    assert!(trace.all_done());

    for pair in plan.layers().windows(2) {
        let last_end = pair[0]
            .tasks
            .iter()
            .map(|t| recorder.position(&Call::End(t.id.to_string())))
            .max()
            .unwrap();
        let first_start = pair[1]
            .tasks
            .iter()
            .map(|t| recorder.position(&Call::Start(t.id.to_string())))
            .min()
            .unwrap();
        assert!(
            last_end < first_start,
            "layer {} started before layer {} finished",
            pair[1].index,
            pair[0].index
        );
    }

    // Timestamps agree with the call log.
    for pair in trace.layers.windows(2) {
        let finished = pair[0].iter().filter_map(|r| r.finished_at).max().unwrap();
        let started = pair[1].iter().filter_map(|r| r.started_at).min().unwrap();
        assert!(finished <= started);
    }
}

/// Test: Worker bound
/// Given 8 independent tasks and 3 processors
/// Then at most 3 run at once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_processor_count() {
    let recorder = RecordingInterpreter::new(Duration::from_millis(25));
    let executor = Executor::new(recorder.clone() as Arc<dyn TaskInterpreter>, procs(3));

    let trace = executor.execute(&plan_of(independent_tasks(8))).await;

    assert!(trace.all_done());
    assert!(recorder.peak() <= 3, "peak concurrency was {}", recorder.peak());
    assert!(recorder.peak() >= 2, "tasks never overlapped");
}

/// Test: Worker bound by layer size
/// Given a widest layer of 2 and 16 processors
/// Then at most 2 run at once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_layer_size() {
    let recorder = RecordingInterpreter::new(Duration::from_millis(10));
    let executor = Executor::new(recorder.clone() as Arc<dyn TaskInterpreter>, procs(16));

    executor.execute(&plan_of(diamond_tasks())).await;
    assert!(recorder.peak() <= 2);
}

/// Test: Failure containment
/// Given T1 failing, T3 depending on T1 and T2 independent
/// Then T3 is skipped and T2 is done
#[tokio::test]
async fn test_failure_skips_only_dependents() {
    let executor = Executor::new(failing_interpreter(&["T1"]), procs(2));
    let plan = plan_of(vec![task("T1", &[]), task("T2", &[]), task("T3", &["T1"])]);

    let trace = executor.execute(&plan).await;

    assert!(matches!(status(&trace, "T1"), TaskStatus::Failed { ref error } if error == "T1 exploded"));
    assert_eq!(status(&trace, "T2"), TaskStatus::Done);
    assert_eq!(
        status(&trace, "T3"),
        TaskStatus::Skipped {
            cause: TaskId::from("T1")
        }
    );
    assert_eq!(trace.failed().count(), 1);
    assert_eq!(trace.skipped().count(), 1);
}

/// Test: Transitive skips name the root failure
#[tokio::test]
async fn test_transitive_skip_names_root_failure() {
    let executor = Executor::new(failing_interpreter(&["T2"]), procs(4));
    let trace = executor.execute(&plan_of(diamond_tasks())).await;

    assert_eq!(status(&trace, "T1"), TaskStatus::Done);
    assert_eq!(status(&trace, "T3"), TaskStatus::Done);
    assert_eq!(
        status(&trace, "T4"),
        TaskStatus::Skipped { cause: "T2".into() }
    );
    assert_eq!(
        status(&trace, "T5"),
        TaskStatus::Skipped { cause: "T2".into() }
    );
    assert_eq!(trace.results().count(), 5);
}

/// Test: Panics are contained like errors
#[tokio::test]
async fn test_interpreter_panic_is_a_failure() {
    let interpreter: Arc<dyn TaskInterpreter> = Arc::new(
        |task: &qpar::Task,
         _: &qpar::DependencyOutputs|
         -> Result<qpar::Payload, qpar::TaskExecutionError> {
            if task.id.as_str() == "T2" {
                panic!("worker crashed");
            }
            Ok(qpar::Payload::Scalar(1.0))
        },
    );
    let executor = Executor::new(interpreter, procs(2));
    let trace = executor
        .execute(&plan_of(vec![task("T1", &[]), task("T2", &[]), task("T3", &["T2"])]))
        .await;

    assert_eq!(status(&trace, "T1"), TaskStatus::Done);
    match status(&trace, "T2") {
        TaskStatus::Failed { error } => assert!(error.contains("worker crashed")),
        other => panic!("Expected failed, got {:?}", other),
    }
    assert!(matches!(status(&trace, "T3"), TaskStatus::Skipped { .. }));
}

/// Test: Event stream mirrors the run
#[tokio::test]
async fn test_event_stream_covers_every_task() {
    let (tx, mut rx) = mpsc::channel(128);
    let executor = Executor::new(failing_interpreter(&["T3"]), procs(2)).with_events(tx);
    executor.execute(&plan_of(diamond_tasks())).await;
    drop(executor);

    let mut completed = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = Vec::new();
    let mut layers_done = 0;
    let mut finished = false;
    while let Some(event) = rx.recv().await {
        match event {
            ExecutorEvent::TaskCompleted { task_id } => completed.push(task_id.to_string()),
            ExecutorEvent::TaskFailed { task_id, .. } => failed.push(task_id.to_string()),
            ExecutorEvent::TaskSkipped { task_id, .. } => skipped.push(task_id.to_string()),
            ExecutorEvent::LayerCompleted { .. } => layers_done += 1,
            ExecutorEvent::AllLayersComplete => finished = true,
            ExecutorEvent::LayerStarted { .. } => {}
        }
    }

    completed.sort();
    assert_eq!(completed, vec!["T1", "T2", "T4"]);
    assert_eq!(failed, vec!["T3"]);
    assert_eq!(skipped, vec!["T5"]);
    assert_eq!(layers_done, 3);
    assert!(finished);
}

/// Test: One executor, several runs
#[tokio::test]
async fn test_executor_is_reusable() {
    let executor = Executor::new(failing_interpreter(&[]), procs(2));
    let first = executor.execute(&plan_of(independent_tasks(3))).await;
    let second = executor.execute(&plan_of(diamond_tasks())).await;

    assert!(first.all_done());
    assert!(second.all_done());
    assert_eq!(second.layers.len(), 3);
}
