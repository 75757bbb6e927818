//! Graph execution engine.
//!
//! The [`Executor`] walks a [`CompiledGraph`] as a state machine over node
//! ids plus the two terminal sentinels. Ready nodes wait in a FIFO queue and
//! are dispatched onto at most `workers` concurrent tasks. Each dispatched
//! node runs its action, then resolves its successor:
//!
//! - non-conditional: the single registered edge, or a silent dead end
//! - conditional: the edge at the index returned by `select_branch`
//!
//! Reaching `DONE` or `ERROR` claims the run's terminal latch, so exactly one
//! callback fires however many branches arrive. The abort flag in the
//! execution context is checked before and after every action.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, debug_span, error, info, info_span, warn};

use crate::config::{EngineConfig, FailurePolicy};
use crate::core::context::ExecutionContext;
use crate::core::types::{NodeId, RunId, Target};
use crate::observer::{DONE_CALLBACK_NAME, NoopObserver, Observer};

use super::latch::TerminalLatch;
use super::outcome::{BranchFault, ErrorCause, ExecutionError, HaltReason, RunOutcome, RunReport};
use super::plan::{CompiledGraph, PlanNode};

/// What a worker reports back after running one node.
enum Step {
    /// The branch continues at this node.
    Advance(NodeId),
    /// The branch reached `DONE` or `ERROR`.
    Terminated,
    /// The branch stopped without a terminal.
    Halted(HaltReason),
}

/// State shared by every worker of one run.
struct RunState {
    nodes: Arc<[PlanNode]>,
    context: Arc<ExecutionContext>,
    latch: Arc<TerminalLatch>,
    observer: Arc<dyn Observer>,
    failure_policy: FailurePolicy,
}

impl RunState {
    async fn step(&self, id: NodeId) -> Step {
        let Some(node) = self.nodes.get(id.index()) else {
            // Entry and every resolved target are bounds-checked before dispatch.
            error!(node = %id, "dispatched node is not part of the plan");
            return Step::Halted(HaltReason::DeadEnd { node: id });
        };

        if self.context.is_aborted() {
            debug!(node = %node.name, "abort requested, not starting node");
            return Step::Halted(HaltReason::Aborted { node: id });
        }

        let result = {
            let _running = node.running.lock().await;
            self.observer.on_entry(&node.name);
            let result = if node.conditional {
                node.unit.select_branch(&self.context, id).await.map(Some)
            } else {
                node.unit.act(&self.context, id).await.map(|()| None)
            };
            self.observer.on_exit(&node.name);
            result
        };

        // Abort wins over both the failure policy and the selected edge.
        if self.context.is_aborted() {
            debug!(node = %node.name, "abort requested during node, halting branch");
            return Step::Halted(HaltReason::Aborted { node: id });
        }

        let selection = match result {
            Ok(selection) => selection,
            Err(err) => return self.task_failed(node, err.to_string()),
        };

        match self.resolve(node, selection) {
            Ok(Some(Target::Node(next))) => {
                debug!(from = %node.name, to = %next, "transition");
                Step::Advance(next)
            }
            Ok(Some(Target::Done)) => self.finish(RunOutcome::Done),
            Ok(Some(Target::Error)) => {
                self.finish(RunOutcome::Error(ErrorCause::Selected { node: id }))
            }
            Ok(None) => {
                debug!(node = %node.name, "no outgoing edge, branch ends without a terminal");
                Step::Halted(HaltReason::DeadEnd { node: id })
            }
            Err(fault) => {
                error!(
                    node = %node.name,
                    fault = %fault,
                    "branch resolution fault, routing to ERROR"
                );
                self.observer.on_fault(&node.name, &fault);
                self.finish(RunOutcome::Error(ErrorCause::BranchFault(fault)))
            }
        }
    }

    /// Pick the edge to follow. `None` means the node has no successor.
    fn resolve(
        &self,
        node: &PlanNode,
        selection: Option<i32>,
    ) -> Result<Option<Target>, BranchFault> {
        let target = match selection {
            None => node.edges.first().copied(),
            Some(index) => {
                let edge = usize::try_from(index)
                    .ok()
                    .and_then(|position| node.edges.get(position))
                    .copied();
                match edge {
                    Some(target) => Some(target),
                    None => {
                        return Err(BranchFault::IndexOutOfRange {
                            node: node.id,
                            name: node.name.clone(),
                            index,
                            edge_count: node.edges.len(),
                        });
                    }
                }
            }
        };

        match target {
            Some(Target::Node(next)) if next.index() >= self.nodes.len() => {
                Err(BranchFault::UnknownTarget {
                    node: node.id,
                    name: node.name.clone(),
                    target: next,
                })
            }
            _ => Ok(target),
        }
    }

    fn task_failed(&self, node: &PlanNode, message: String) -> Step {
        match self.failure_policy {
            FailurePolicy::Halt => {
                warn!(node = %node.name, error = %message, "task failed, halting branch");
                Step::Halted(HaltReason::TaskFailed {
                    node: node.id,
                    message,
                })
            }
            FailurePolicy::RouteToError => {
                warn!(node = %node.name, error = %message, "task failed, routing to ERROR");
                self.finish(RunOutcome::Error(ErrorCause::TaskFailed {
                    node: node.id,
                    message,
                }))
            }
        }
    }

    fn finish(&self, outcome: RunOutcome) -> Step {
        let reached_done = outcome == RunOutcome::Done;
        match self.latch.claim(outcome.clone()) {
            Some(callback) if reached_done => {
                self.observer.on_entry(DONE_CALLBACK_NAME);
                callback();
                self.observer.on_exit(DONE_CALLBACK_NAME);
                info!("run reached DONE");
            }
            Some(callback) => {
                callback();
                info!(outcome = ?outcome, "run reached ERROR");
            }
            None => {
                debug!(outcome = ?outcome, "terminal already fired, ignoring arrival");
            }
        }
        Step::Terminated
    }
}

/// Runs compiled graphs on a bounded pool of workers.
#[derive(Clone)]
pub struct Executor {
    workers: usize,
    failure_policy: FailurePolicy,
    max_steps: Option<u64>,
    observer: Arc<dyn Observer>,
}

impl Executor {
    /// Create an executor with `workers` concurrent workers (at least 1).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            failure_policy: FailurePolicy::default(),
            max_steps: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Create an executor from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let executor = Self::new(config.workers).with_failure_policy(config.failure_policy);
        match config.max_steps {
            Some(max_steps) => executor.with_max_steps(max_steps),
            None => executor,
        }
    }

    /// Attach an observer notified on every state entry and exit.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Choose how task unit errors are handled.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Stop dispatching after `max_steps` node actions (at least 1).
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps.max(1));
        self
    }

    /// Get the worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Get the failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Start a run in the background and return its join point.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, graph: CompiledGraph) -> RunHandle {
        let run_id = graph.run_id;
        let executor = self.clone();
        let handle = tokio::spawn(async move { executor.execute(graph).await });
        RunHandle { run_id, handle }
    }

    /// Run a compiled graph to completion.
    ///
    /// Returns once every branch has terminated or halted. A panic inside a
    /// task unit is not caught and propagates to the caller.
    pub async fn execute(&self, graph: CompiledGraph) -> RunReport {
        let span = info_span!(
            "graph_run",
            run = %graph.run_id,
            graph = %graph.graph_name,
            workers = self.workers,
        );
        self.drive(graph).instrument(span).await
    }

    async fn drive(&self, graph: CompiledGraph) -> RunReport {
        let CompiledGraph {
            run_id,
            entry,
            nodes,
            context,
            latch,
            ..
        } = graph;

        let state = Arc::new(RunState {
            nodes,
            context,
            latch: Arc::clone(&latch),
            observer: Arc::clone(&self.observer),
            failure_policy: self.failure_policy,
        });

        debug!(entry = %entry, "starting graph run");
        let start_time = Instant::now();

        let mut ready: VecDeque<NodeId> = VecDeque::from([entry]);
        let mut in_flight: JoinSet<Step> = JoinSet::new();
        let mut steps = 0u64;
        let mut halts = Vec::new();
        let mut limit_reached = false;

        loop {
            while in_flight.len() < self.workers {
                let Some(id) = ready.pop_front() else {
                    break;
                };

                if self.max_steps.is_some_and(|limit| steps >= limit) {
                    warn!(steps, "step limit reached, dropping pending nodes");
                    ready.clear();
                    limit_reached = true;
                    halts.push(HaltReason::StepLimit { steps });
                    break;
                }

                steps += 1;
                let state = Arc::clone(&state);
                in_flight.spawn(
                    async move { state.step(id).await }
                        .instrument(debug_span!("graph_node", node = %id)),
                );
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok(Step::Advance(next)) if !limit_reached => ready.push_back(next),
                Ok(Step::Advance(next)) => {
                    debug!(node = %next, "step limit reached, not dispatching");
                }
                Ok(Step::Terminated) => {}
                Ok(Step::Halted(reason)) => halts.push(reason),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => warn!(error = %err, "node task cancelled"),
            }
        }

        let outcome = latch.outcome();
        let duration = start_time.elapsed();

        debug!(
            outcome = ?outcome,
            fired = latch.has_fired(),
            steps,
            halted = halts.len(),
            duration_ms = %duration.as_millis(),
            "graph run finished"
        );

        RunReport {
            run_id,
            outcome,
            steps,
            duration,
            halts,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Join point for a run started with [`Executor::run`] or [`run`].
pub struct RunHandle {
    run_id: RunId,
    handle: JoinHandle<RunReport>,
}

impl RunHandle {
    /// The run being awaited.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether the run has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunReport, ExecutionError> {
        match self.handle.await {
            Ok(report) => Ok(report),
            Err(err) if err.is_panic() => Err(ExecutionError::Panicked {
                run_id: self.run_id,
                message: panic_message(err.into_panic()),
            }),
            Err(_) => Err(ExecutionError::Cancelled(self.run_id)),
        }
    }
}

/// Run `graph` on a fresh executor with `workers` workers.
pub fn run(graph: CompiledGraph, workers: usize) -> RunHandle {
    Executor::new(workers).run(graph)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
