//! Reference routing scenario.
//!
//! Builds the seven-node reference graph, checks the structural rules at
//! build time, and verifies the executed path and terminal callback.

use crate::common::{reference_graph, unit};
use branchflow::testing::{CallbackCounter, TestHarness};
use branchflow::{
    DONE, DONE_CALLBACK_NAME, ERROR, EngineConfig, ErrorCause, ExecutionContext, Executor, Graph,
    GraphError, GraphSnapshot, RunOutcome, TraceRecorder, run,
};
use std::sync::Arc;

#[tokio::test]
async fn test_reference_graph_reaches_done() {
    let (graph, _) = reference_graph();
    let counter = CallbackCounter::new();
    let recorder = Arc::new(TraceRecorder::new());

    let plan = counter
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    let report = Executor::new(1)
        .with_observer(recorder.clone())
        .run(plan)
        .wait()
        .await
        .unwrap();

    assert_eq!(
        recorder.executed(),
        vec!["A", "A0", "A02", DONE_CALLBACK_NAME]
    );
    assert!(report.is_done());
    assert_eq!(report.steps, 3);
    assert_eq!(counter.done(), 1);
    assert_eq!(counter.error(), 0);
}

#[tokio::test]
async fn test_non_conditional_nodes_reject_extra_edges() {
    let (mut graph, nodes) = reference_graph();

    for node in [nodes.a1, nodes.a2] {
        let err = graph
            .add_edges(node, &[nodes.a00.into(), nodes.a01.into(), nodes.a02.into()])
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::TooManyEdges {
                existing: 0,
                requested: 3,
                ..
            }
        ));
        // Rejected additions leave the node untouched.
        assert_eq!(graph.edges(node), Some(&[][..]));
    }

    // The graph stays usable after the rejections.
    let counter = CallbackCounter::new();
    let recorder = Arc::new(TraceRecorder::new());
    let plan = counter
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    let report = Executor::new(1)
        .with_observer(recorder.clone())
        .execute(plan)
        .await;

    assert!(report.is_done());
    assert_eq!(
        recorder.executed(),
        vec!["A", "A0", "A02", DONE_CALLBACK_NAME]
    );
    assert_eq!((counter.done(), counter.error()), (1, 0));
}

#[tokio::test]
async fn test_selected_error_fires_only_on_error() {
    let mut graph = Graph::new("reject");
    let a = graph.add_node(unit("A", 0), true);
    let a0 = graph.add_node(unit("A0", 0), true);
    let a00 = graph.add_node(unit("A00", -1), false);
    graph.add_edges(a, &[a0.into()]).unwrap();
    graph.add_edges(a0, &[ERROR, a00.into(), DONE]).unwrap();
    graph.add_edges(a00, &[DONE]).unwrap();

    let run = TestHarness::new().run_and_assert_error(&graph).await;

    // Only DONE is traced as a pseudo-task.
    assert_eq!(run.trace.executed(), vec!["A", "A0"]);
    assert_eq!(
        run.report.outcome,
        RunOutcome::Error(ErrorCause::Selected { node: a0 })
    );
    assert!(run.report.fault().is_none());
}

#[tokio::test]
async fn test_compiling_twice_gives_independent_runs() {
    let (graph, _) = reference_graph();
    let first = CallbackCounter::new();
    let second = CallbackCounter::new();

    let first_plan = first
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    let second_plan = second
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    assert_ne!(first_plan.run_id(), second_plan.run_id());

    let executor = Executor::new(2);
    let (first_report, second_report) =
        tokio::join!(executor.execute(first_plan), executor.execute(second_plan));

    assert!(first_report.is_done());
    assert!(second_report.is_done());
    assert_eq!((first.done(), first.error()), (1, 0));
    assert_eq!((second.done(), second.error()), (1, 0));
}

#[tokio::test]
async fn test_single_worker_trace_is_deterministic() {
    let (graph, _) = reference_graph();
    let harness = TestHarness::new();

    let expected = harness.run_and_assert_done(&graph).await.trace;
    for _ in 0..10 {
        let run = harness.run_and_assert_done(&graph).await;
        assert_eq!(run.trace, expected);
    }
}

#[tokio::test]
async fn test_results_follow_visit_order() {
    let (graph, _) = reference_graph();

    let run = TestHarness::new()
        .with_workers(4)
        .run_and_assert_done(&graph)
        .await;

    assert_eq!(run.visited(), vec!["A", "A0", "A02"]);
}

#[tokio::test]
async fn test_free_run_and_config_driven_executor() {
    let (graph, _) = reference_graph();

    let counter = CallbackCounter::new();
    let plan = counter
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    let report = run(plan, 1).wait().await.unwrap();
    assert!(report.is_done());

    let config = EngineConfig::from_yaml_str("workers: 4\nmax_steps: 100").unwrap();
    let counter_from_config = CallbackCounter::new();
    let plan = counter_from_config
        .compile(&graph, Arc::new(ExecutionContext::default()))
        .unwrap();
    let report = Executor::from_config(&config).execute(plan).await;

    assert!(report.is_done());
    assert_eq!(counter.total() + counter_from_config.total(), 2);
}

#[test]
fn test_graph_dump_to_dot_file() {
    let (graph, nodes) = reference_graph();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.dot");

    std::fs::write(&path, graph.to_dot()).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();

    assert!(dot.starts_with("digraph \"reference\" {"));
    assert!(dot.contains(&format!("n{} [label=\"A02\", shape=diamond];", nodes.a02)));
    assert!(dot.contains(&format!("n{} -> done [style=dashed, label=\"4\"];", nodes.a0)));
    assert!(dot.contains(&format!("n{} -> error [style=dashed, label=\"0\"];", nodes.a0)));
    assert!(dot.trim_end().ends_with('}'));
}

#[test]
fn test_graph_snapshot_serializes() {
    let (graph, nodes) = reference_graph();

    let json = serde_json::to_string(&graph.snapshot()).unwrap();
    let snapshot: GraphSnapshot = serde_json::from_str(&json).unwrap();

    assert_eq!(snapshot, graph.snapshot());
    assert_eq!(snapshot.nodes.len(), 7);
    assert_eq!(snapshot.nodes[nodes.a02.index()].edges, vec![ERROR, DONE]);
    assert!(snapshot.nodes[nodes.a.index()].conditional);
}
