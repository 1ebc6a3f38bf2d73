//! Parallel dispatch correctness tests.
//!
//! These tests verify that tasks of one layer run concurrently, that the
//! concurrency bound holds, and that layers never overlap.

use std::sync::Arc;
use std::time::Duration;

use taskweave::orchestration::{Context, Goal, RunEventKind};

use crate::fixtures::{
    chain_steps, diamond_steps, independent_steps, orchestrator_with_steps, ConcurrencyProbe,
    TEMPLATE_ID,
};

fn goal() -> Goal {
    Goal::new("fan out").with_type(TEMPLATE_ID)
}

/// Test: Parallel Execution - 4 independent tasks
/// Given 4 independent tasks and a bound of 4
/// When the run executes
/// Then all 4 workers are in flight together
#[tokio::test(start_paused = true)]
async fn test_parallel_execution_four_workers() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(100));
    let mut orchestrator = orchestrator_with_steps(independent_steps(4, "probe"))
        .with_max_concurrent_workers(4);
    orchestrator.register_worker("probe", probe.clone());

    let result = orchestrator.execute(&goal(), &Context::new("fan out")).await.unwrap();

    assert_eq!(result.layers.len(), 1);
    assert_eq!(result.completed_count(), 4);
    assert_eq!(probe.peak(), 4, "all 4 tasks should run at once");
}

/// Test: Parallel execution respects the bound
/// Given 6 independent tasks and a bound of 3
/// When the run executes
/// Then at most 3 workers are ever in flight
#[tokio::test(start_paused = true)]
async fn test_parallel_respects_bound() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(100));
    let mut orchestrator = orchestrator_with_steps(independent_steps(6, "probe"))
        .with_max_concurrent_workers(3);
    orchestrator.register_worker("probe", probe.clone());

    let result = orchestrator.execute(&goal(), &Context::new("fan out")).await.unwrap();

    assert_eq!(result.completed_count(), 6);
    assert_eq!(probe.calls(), 6);
    assert_eq!(probe.peak(), 3);
}

/// Test: Bound of one serializes the layer
/// Given 5 independent tasks and a bound of 1
/// When the run executes
/// Then calls never overlap
#[tokio::test(start_paused = true)]
async fn test_bound_of_one_is_sequential() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(10));
    let mut orchestrator = orchestrator_with_steps(independent_steps(5, "probe"))
        .with_max_concurrent_workers(1);
    orchestrator.register_worker("probe", probe.clone());

    orchestrator.execute(&goal(), &Context::new("fan out")).await.unwrap();
    assert_eq!(probe.peak(), 1);
}

/// Test: Chains never overlap
/// Given a 5-step chain and a generous bound
/// When the run executes
/// Then each layer holds one task and only one call is ever in flight
#[tokio::test(start_paused = true)]
async fn test_chain_runs_one_at_a_time() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(10));
    let mut orchestrator =
        orchestrator_with_steps(chain_steps(5, "probe")).with_max_concurrent_workers(8);
    orchestrator.register_worker("probe", probe.clone());

    let result = orchestrator.execute(&goal(), &Context::new("chain")).await.unwrap();

    assert_eq!(result.layers.len(), 5);
    assert!(result.layers.iter().all(|layer| layer.len() == 1));
    assert_eq!(result.completed_count(), 5);
    assert_eq!(probe.peak(), 1);
}

/// Test: Layer k finishes before layer k+1 starts
/// Given a diamond
/// When the run executes
/// Then every task of a layer is finished before the next layer starts
#[tokio::test(start_paused = true)]
async fn test_layers_are_barriers() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(10));
    let mut orchestrator = orchestrator_with_steps(diamond_steps("probe"));
    orchestrator.register_worker("probe", probe.clone());

    let context = Context::new("diamond");
    let result = orchestrator.execute(&goal(), &context).await.unwrap();
    assert_eq!(result.completed_count(), 4);
    assert_eq!(probe.peak(), 2, "left and right share a layer");

    let events = orchestrator.events();
    let log = events.read().await;
    let mut finished_so_far = 0;
    for event in log.for_run(&context.run_id) {
        match &event.kind {
            RunEventKind::LayerStarted { index, .. } => {
                let expected = match index {
                    0 => 0,
                    1 => 1,
                    _ => 3,
                };
                assert_eq!(finished_so_far, expected, "layer {} started early", index);
            }
            RunEventKind::TaskFinished { .. } => finished_so_far += 1,
            _ => {}
        }
    }
    assert_eq!(finished_so_far, 4);
}

/// Test: Shared orchestrator across concurrent runs
/// Given one orchestrator behind an Arc
/// When two runs execute concurrently
/// Then both complete with their own run ids
#[tokio::test]
async fn test_concurrent_runs_share_orchestrator() {
    let probe = ConcurrencyProbe::new(Duration::from_millis(5));
    let mut orchestrator = orchestrator_with_steps(independent_steps(3, "probe"));
    orchestrator.register_worker("probe", probe.clone());
    let orchestrator = Arc::new(orchestrator);

    let (goal_one, goal_two) = (goal(), goal());
    let first = Context::new("one");
    let second = Context::new("two");
    let (a, b) = tokio::join!(
        orchestrator.execute(&goal_one, &first),
        orchestrator.execute(&goal_two, &second)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.completed_count() + b.completed_count(), 6);
    assert_eq!(probe.calls(), 6);
}
