//! Run outcomes and reports.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::{NodeId, RunId};

/// A conditional transition the engine could not resolve.
///
/// Faults are routed to the `ERROR` terminal like a deliberate failure
/// branch, but are logged and reported as scheduler faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BranchFault {
    /// The selected index does not address a registered edge.
    #[error("node '{name}' ({node}) selected branch {index} but has {edge_count} edge(s)")]
    IndexOutOfRange {
        node: NodeId,
        name: String,
        index: i32,
        edge_count: usize,
    },

    /// The resolved edge points at a node id that was never registered.
    #[error("node '{name}' ({node}) routes to unregistered node {target}")]
    UnknownTarget {
        node: NodeId,
        name: String,
        target: NodeId,
    },
}

impl BranchFault {
    /// The node whose transition failed to resolve.
    pub fn node(&self) -> NodeId {
        match self {
            BranchFault::IndexOutOfRange { node, .. } | BranchFault::UnknownTarget { node, .. } => {
                *node
            }
        }
    }
}

/// Why a run ended at `ERROR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCause {
    /// A node's edge led to `ERROR`.
    Selected { node: NodeId },
    /// The engine could not resolve a transition.
    BranchFault(BranchFault),
    /// A task unit failed and the failure policy routes failures to `ERROR`.
    TaskFailed { node: NodeId, message: String },
}

/// Terminal state reached by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `on_done` fired.
    Done,
    /// `on_error` fired.
    Error(ErrorCause),
    /// No terminal was reached. Every live branch halted.
    Halted,
}

/// Why a single branch stopped without reaching a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The abort flag was observed before or after the node's action.
    Aborted { node: NodeId },
    /// A non-conditional node with no outgoing edge finished.
    DeadEnd { node: NodeId },
    /// A task unit returned an error under the halting failure policy.
    TaskFailed { node: NodeId, message: String },
    /// The executor's step limit was reached.
    StepLimit { steps: u64 },
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The run that produced this report.
    pub run_id: RunId,
    /// Which terminal fired, if any.
    pub outcome: RunOutcome,
    /// Number of node actions dispatched.
    pub steps: u64,
    /// Wall time from dispatch of the entry node to the last branch finishing.
    pub duration: Duration,
    /// Branches that stopped without reaching a terminal.
    pub halts: Vec<HaltReason>,
}

impl RunReport {
    /// Whether `on_done` fired.
    pub fn is_done(&self) -> bool {
        self.outcome == RunOutcome::Done
    }

    /// Whether `on_error` fired, for any cause.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RunOutcome::Error(_))
    }

    /// Whether a terminal callback fired at all.
    pub fn terminated(&self) -> bool {
        self.outcome != RunOutcome::Halted
    }

    /// The scheduler fault that ended the run, if that is how it ended.
    pub fn fault(&self) -> Option<&BranchFault> {
        match &self.outcome {
            RunOutcome::Error(ErrorCause::BranchFault(fault)) => Some(fault),
            _ => None,
        }
    }
}

/// Errors surfaced when joining a run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A task unit panicked. The engine does not catch task panics.
    #[error("run {run_id} panicked: {message}")]
    Panicked { run_id: RunId, message: String },

    /// The run task was cancelled before it finished.
    #[error("run {0} was cancelled")]
    Cancelled(RunId),
}
