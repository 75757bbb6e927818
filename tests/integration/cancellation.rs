//! Abort, failure and fault handling.
//!
//! Runs that end without reaching a terminal, and runs forced into `ERROR`
//! by the scheduler rather than by a task's decision.

use crate::common::unit;
use branchflow::testing::{CallbackCounter, ScriptedUnit, TestHarness};
use branchflow::{
    BranchFault, DONE, ERROR, ErrorCause, ExecutionContext, Executor, FailurePolicy, Graph,
    HaltReason, NodeId, RunOutcome, Target,
};
use std::sync::Arc;
use std::time::Duration;

fn chain_after(first: ScriptedUnit) -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new("chain");
    let a = graph.add_node(Arc::new(first), false);
    let b = graph.add_node(unit("B", 0), false);
    graph.add_edges(a, &[b.into()]).unwrap();
    graph.add_edges(b, &[DONE]).unwrap();
    (graph, a, b)
}

#[tokio::test(start_paused = true)]
async fn test_external_abort_stops_after_current_node() {
    let (graph, a, _) = chain_after(ScriptedUnit::new("A").with_delay(Duration::from_secs(10)));

    let counter = CallbackCounter::new();
    let ctx = Arc::new(ExecutionContext::default());
    let plan = counter.compile(&graph, Arc::clone(&ctx)).unwrap();
    let handle = Executor::new(2).run(plan);

    tokio::time::sleep(Duration::from_secs(1)).await;
    ctx.abort();

    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Halted);
    assert_eq!(report.halts, vec![HaltReason::Aborted { node: a }]);
    assert_eq!(ctx.results().len(), 1);
    assert_eq!(counter.total(), 0);
}

#[tokio::test]
async fn test_abort_from_inside_a_unit() {
    let (graph, a, _) = chain_after(ScriptedUnit::new("A").aborting());

    let run = TestHarness::new().run(&graph).await.unwrap();

    assert_eq!(run.report.halts, vec![HaltReason::Aborted { node: a }]);
    assert_eq!(run.visited(), vec!["A"]);
    assert_eq!(run.trace.executed(), vec!["A"]);
    assert_eq!(run.done + run.error, 0);
}

#[tokio::test]
async fn test_abort_takes_priority_over_task_failure() {
    for policy in [FailurePolicy::Halt, FailurePolicy::RouteToError] {
        let (graph, a, _) = chain_after(ScriptedUnit::new("A").aborting().failing("disk full"));

        let run = TestHarness::new()
            .with_failure_policy(policy)
            .run(&graph)
            .await
            .unwrap();

        assert!(run.context.is_aborted());
        assert_eq!(run.report.outcome, RunOutcome::Halted);
        assert_eq!(run.report.halts, vec![HaltReason::Aborted { node: a }]);
        assert_eq!(run.visited(), vec!["A"]);
        assert_eq!(run.done + run.error, 0);
    }
}

#[tokio::test]
async fn test_failure_halts_under_default_policy() {
    let (graph, a, _) = chain_after(ScriptedUnit::new("A").failing("disk full"));

    let run = TestHarness::new().run(&graph).await.unwrap();

    assert_eq!(
        run.report.halts,
        vec![HaltReason::TaskFailed {
            node: a,
            message: "execution failed: disk full".to_string(),
        }]
    );
    assert_eq!(run.done + run.error, 0);
}

#[tokio::test]
async fn test_failure_routes_to_error_when_configured() {
    let (graph, a, _) = chain_after(ScriptedUnit::new("A").failing("disk full"));

    let run = TestHarness::new()
        .with_failure_policy(FailurePolicy::RouteToError)
        .run_and_assert_error(&graph)
        .await;

    assert!(matches!(
        run.report.outcome,
        RunOutcome::Error(ErrorCause::TaskFailed { node, .. }) if node == a
    ));
    assert!(run.report.halts.is_empty());
}

#[tokio::test]
async fn test_out_of_range_selection_is_distinguishable_from_error() {
    for branch in [3, 99, -1] {
        let mut graph = Graph::new("fault");
        let a = graph.add_node(unit("A", branch), true);
        let b = graph.add_node(unit("B", 0), false);
        graph.add_edges(a, &[ERROR, b.into(), DONE]).unwrap();
        graph.add_edges(b, &[DONE]).unwrap();

        let run = TestHarness::new().run_and_assert_error(&graph).await;

        assert_eq!(
            run.report.fault(),
            Some(&BranchFault::IndexOutOfRange {
                node: a,
                name: "A".to_string(),
                index: branch,
                edge_count: 3,
            })
        );
        assert_eq!(run.trace.faults(), vec!["A"]);
        assert_eq!(run.visited(), vec!["A"]);
    }
}

#[tokio::test]
async fn test_dangling_target_is_a_fault() {
    let mut graph = Graph::new("dangling");
    let a = graph.add_node(unit("A", 0), false);
    graph.add_edges(a, &[Target::Node(NodeId::new(42))]).unwrap();

    let run = TestHarness::new().run_and_assert_error(&graph).await;

    assert!(matches!(
        run.report.fault(),
        Some(BranchFault::UnknownTarget { node, target, .. })
            if *node == a && target.index() == 42
    ));
}

#[tokio::test]
async fn test_dead_end_completes_without_callback() {
    let mut graph = Graph::new("dead_end");
    let a = graph.add_node(unit("A", 0), false);
    let b = graph.add_node(unit("B", 0), false);
    graph.add_edges(a, &[b.into()]).unwrap();

    let run = TestHarness::new().run(&graph).await.unwrap();

    // Silent completion: neither callback fires.
    assert_eq!(run.report.outcome, RunOutcome::Halted);
    assert_eq!(run.report.halts, vec![HaltReason::DeadEnd { node: b }]);
    assert_eq!(run.visited(), vec!["A", "B"]);
    assert_eq!(run.done + run.error, 0);
}

#[tokio::test]
async fn test_step_limit_ends_infinite_loop() {
    let mut graph = Graph::new("spin");
    let a = graph.add_node(unit("A", 0), true);
    graph.add_edges(a, &[a.into(), DONE]).unwrap();

    let run = TestHarness::new()
        .with_workers(4)
        .with_max_steps(25)
        .run(&graph)
        .await
        .unwrap();

    assert_eq!(run.report.steps, 25);
    assert_eq!(run.report.halts, vec![HaltReason::StepLimit { steps: 25 }]);
    assert_eq!(run.visited().len(), 25);
    assert_eq!(run.done + run.error, 0);
}
