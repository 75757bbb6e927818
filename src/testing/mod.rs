//! Testing utilities for users of the branchflow library.
//!
//! This module provides helpers for testing conditional graphs:
//!
//! - [`ScriptedUnit`]: A task unit with a fixed branch and optional failure
//! - [`CallbackCounter`]: Terminal callbacks that count how often they fire
//! - [`TestHarness`]: Compiles and runs a graph with a trace recorder attached

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::FailurePolicy;
use crate::core::context::ExecutionContext;
use crate::core::graph::{Graph, GraphError};
use crate::core::task::{TaskError, TaskUnit};
use crate::core::types::NodeId;
use crate::execution::{CompiledGraph, Executor, RunReport, compile};
use crate::observer::{ExecutionTrace, TraceRecorder};

/// A task unit whose behavior is fixed up front.
///
/// Every invocation pushes the unit's name onto the context's result
/// accumulator, so the accumulator ends up holding the visit order.
///
/// # Example
///
/// ```
/// use branchflow::testing::ScriptedUnit;
///
/// // Conditional unit that always selects edge 2
/// let unit = ScriptedUnit::branching("router", 2);
/// assert_eq!(unit.calls(), 0);
/// ```
pub struct ScriptedUnit {
    name: String,
    branch: i32,
    calls: AtomicUsize,
    aborts: bool,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedUnit {
    /// Create a unit that selects edge 0 when used as a conditional node.
    pub fn new(name: impl Into<String>) -> Self {
        Self::branching(name, 0)
    }

    /// Create a unit that selects `branch` when used as a conditional node.
    pub fn branching(name: impl Into<String>, branch: i32) -> Self {
        Self {
            name: name.into(),
            branch,
            calls: AtomicUsize::new(0),
            aborts: false,
            failure: None,
            delay: None,
        }
    }

    /// Request an abort of the run while executing.
    pub fn aborting(mut self) -> Self {
        self.aborts = true;
        self
    }

    /// Fail every invocation with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep for `delay` before doing anything else.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times the unit has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn perform(&self, ctx: &ExecutionContext) -> Result<(), TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        ctx.results().push(&self.name)?;

        if self.aborts {
            ctx.abort();
        }

        match &self.failure {
            Some(message) => Err(TaskError::ExecutionFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskUnit for ScriptedUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn act(&self, ctx: &ExecutionContext, _node: NodeId) -> Result<(), TaskError> {
        self.perform(ctx).await
    }

    async fn select_branch(&self, ctx: &ExecutionContext, _node: NodeId) -> Result<i32, TaskError> {
        self.perform(ctx).await?;
        Ok(self.branch)
    }
}

/// A pair of terminal callbacks that count their invocations.
#[derive(Debug, Clone, Default)]
pub struct CallbackCounter {
    done: Arc<AtomicUsize>,
    error: Arc<AtomicUsize>,
}

impl CallbackCounter {
    /// Create a counter with both counts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that bumps the done count.
    pub fn on_done(&self) -> impl FnOnce() + Send + 'static {
        let done = Arc::clone(&self.done);
        move || {
            done.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Callback that bumps the error count.
    pub fn on_error(&self) -> impl FnOnce() + Send + 'static {
        let error = Arc::clone(&self.error);
        move || {
            error.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Compile `graph` with this counter's callbacks.
    pub fn compile(
        &self,
        graph: &Graph,
        context: Arc<ExecutionContext>,
    ) -> Result<CompiledGraph, GraphError> {
        compile(graph, context, self.on_done(), self.on_error())
    }

    /// Times `on_done` fired.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    /// Times `on_error` fired.
    pub fn error(&self) -> usize {
        self.error.load(Ordering::SeqCst)
    }

    /// Total terminal callbacks fired.
    pub fn total(&self) -> usize {
        self.done() + self.error()
    }
}

/// A test harness for running graphs.
///
/// Provides:
/// - Execution with a configurable worker count and failure policy
/// - A fresh context seeded with a payload for every run
/// - The recorded trace and callback counts alongside the run report
///
/// # Example
///
/// ```ignore
/// use branchflow::testing::TestHarness;
///
/// let harness = TestHarness::new().with_workers(2);
/// let run = harness.run_and_assert_done(&graph).await;
/// assert_eq!(run.trace.executed(), vec!["A", "B", "Done Callback"]);
/// ```
pub struct TestHarness {
    workers: usize,
    failure_policy: FailurePolicy,
    max_steps: Option<u64>,
    payload: Value,
}

/// Result from TestHarness execution.
pub struct HarnessRun {
    /// The run report.
    pub report: RunReport,
    /// Exit and fault events recorded during the run.
    pub trace: ExecutionTrace,
    /// The context the run was bound to.
    pub context: Arc<ExecutionContext>,
    /// Times `on_done` fired.
    pub done: usize,
    /// Times `on_error` fired.
    pub error: usize,
}

impl HarnessRun {
    /// Names pushed by [`ScriptedUnit`]s, in push order.
    pub fn visited(&self) -> Vec<String> {
        self.context
            .results()
            .snapshot()
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect()
    }
}

impl TestHarness {
    /// Create a harness with one worker and default settings.
    pub fn new() -> Self {
        Self {
            workers: 1,
            failure_policy: FailurePolicy::default(),
            max_steps: None,
            payload: Value::Null,
        }
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Bound the number of node actions per run.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Set the payload every run's context starts with.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Build the executor this harness runs graphs on.
    pub fn executor(&self) -> Executor {
        let executor = Executor::new(self.workers).with_failure_policy(self.failure_policy);
        match self.max_steps {
            Some(max_steps) => executor.with_max_steps(max_steps),
            None => executor,
        }
    }

    /// Compile and run a graph, returning everything observed.
    pub async fn run(&self, graph: &Graph) -> Result<HarnessRun, GraphError> {
        let recorder = Arc::new(TraceRecorder::new());
        let counter = CallbackCounter::new();
        let context = Arc::new(ExecutionContext::new(self.payload.clone()));

        let plan = counter.compile(graph, Arc::clone(&context))?;
        let report = self
            .executor()
            .with_observer(recorder.clone())
            .execute(plan)
            .await;

        Ok(HarnessRun {
            report,
            trace: recorder.trace(),
            context,
            done: counter.done(),
            error: counter.error(),
        })
    }

    /// Run and assert that `on_done` fired exactly once.
    pub async fn run_and_assert_done(&self, graph: &Graph) -> HarnessRun {
        let run = self
            .run(graph)
            .await
            .unwrap_or_else(|err| panic!("graph '{}' failed to compile: {}", graph.name(), err));
        assert!(
            run.report.is_done() && run.done == 1 && run.error == 0,
            "Expected graph to reach DONE, got {:?} (done: {}, error: {})",
            run.report.outcome,
            run.done,
            run.error
        );
        run
    }

    /// Run and assert that `on_error` fired exactly once.
    pub async fn run_and_assert_error(&self, graph: &Graph) -> HarnessRun {
        let run = self
            .run(graph)
            .await
            .unwrap_or_else(|err| panic!("graph '{}' failed to compile: {}", graph.name(), err));
        assert!(
            run.report.is_error() && run.error == 1 && run.done == 0,
            "Expected graph to reach ERROR, got {:?} (done: {}, error: {})",
            run.report.outcome,
            run.done,
            run.error
        );
        run
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
