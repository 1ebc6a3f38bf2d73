//! Cancellation and timeout tests.
//!
//! These tests verify that cancelling a run keeps finished results, marks
//! unfinished tasks as cancelled, and that slow workers hit the timeout.

use std::time::Duration;

use taskweave::core::TaskStatus;
use taskweave::orchestration::{Context, Goal, RunEventKind, RunStatus, TaskError};

use crate::fixtures::{
    orchestrator_with_steps, step, EchoWorker, SlowWorker, TokenCapture, TEMPLATE_ID,
};

fn goal() -> Goal {
    Goal::new("long job").with_type(TEMPLATE_ID)
}

/// Test: Cancel mid-layer
/// Given a fast and a slow task in layer 0 and a dependent in layer 1
/// When the run is cancelled while the slow task is in flight
/// Then the fast result is kept and the rest are cancelled
#[tokio::test(start_paused = true)]
async fn test_cancel_keeps_finished_results() {
    let mut orchestrator = orchestrator_with_steps(vec![
        step("fast", "echo", &[]),
        step("slow", "slow", &[]),
        step("after", "echo", &["fast"]),
    ]);
    orchestrator.register_worker("echo", EchoWorker::new("echo"));
    orchestrator.register_worker("slow", SlowWorker::new(Duration::from_secs(600)));

    let context = Context::new("long job");
    let canceller = context.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = orchestrator.execute(&goal(), &context).await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.task("fast").unwrap().status, TaskStatus::Completed);

    let slow = result.task("slow").unwrap();
    assert_eq!(slow.status, TaskStatus::Skipped);
    assert_eq!(slow.error, Some(TaskError::Cancelled));

    let after = result.task("after").unwrap();
    assert_eq!(after.error, Some(TaskError::Cancelled));
    assert_eq!(result.tasks.len(), 3);

    let events = orchestrator.events();
    let log = events.read().await;
    assert!(log
        .for_run(&context.run_id)
        .any(|e| e.kind == RunEventKind::RunCancelled));
}

/// Test: Cancel before start
/// Given an already-cancelled context
/// When the run executes
/// Then no worker is called
#[tokio::test]
async fn test_cancel_before_start() {
    let capture = TokenCapture::new();
    let mut orchestrator = orchestrator_with_steps(vec![step("only", "capture", &[])]);
    orchestrator.register_worker("capture", capture.clone());

    let context = Context::new("long job");
    context.cancel();
    let result = orchestrator.execute(&goal(), &context).await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.task("only").unwrap().error, Some(TaskError::Cancelled));
    assert!(capture.captured().is_none(), "worker must not be called");
}

/// Test: Workers see cancellation
/// Given a worker waiting on its context
/// When the run is cancelled
/// Then the worker's child token has fired
#[tokio::test(start_paused = true)]
async fn test_worker_token_is_child_of_run() {
    let capture = TokenCapture::new();
    let mut orchestrator = orchestrator_with_steps(vec![step("wait", "capture", &[])]);
    orchestrator.register_worker("capture", capture.clone());

    let context = Context::new("long job");
    let canceller = context.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = orchestrator.execute(&goal(), &context).await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);

    let token = capture.captured().expect("worker should have run");
    assert!(token.is_cancelled());
}

/// Test: Worker timeout
/// Given a worker slower than the configured timeout
/// When the run executes
/// Then that task fails with a worker execution error and the run completes
#[tokio::test(start_paused = true)]
async fn test_worker_timeout_fails_task() {
    let mut orchestrator = orchestrator_with_steps(vec![
        step("slow", "slow", &[]),
        step("quick", "echo", &[]),
    ])
    .with_worker_timeout(Some(Duration::from_secs(1)));
    orchestrator.register_worker("slow", SlowWorker::new(Duration::from_secs(30)));
    orchestrator.register_worker("echo", EchoWorker::new("echo"));

    let result = orchestrator
        .execute(&goal(), &Context::new("long job"))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    let slow = result.task("slow").unwrap();
    assert_eq!(slow.status, TaskStatus::Failed);
    match &slow.error {
        Some(TaskError::WorkerExecution(message)) => assert!(message.contains("timed out")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(result.task("quick").unwrap().status, TaskStatus::Completed);
}

/// Test: Fast workers beat the timeout
/// Given a timeout longer than the worker's delay
/// When the run executes
/// Then the task completes
#[tokio::test(start_paused = true)]
async fn test_worker_within_timeout_completes() {
    let mut orchestrator = orchestrator_with_steps(vec![step("slow", "slow", &[])])
        .with_worker_timeout(Some(Duration::from_secs(5)));
    orchestrator.register_worker("slow", SlowWorker::new(Duration::from_secs(1)));

    let result = orchestrator
        .execute(&goal(), &Context::new("long job"))
        .await
        .unwrap();
    assert_eq!(result.completed_count(), 1);
}
