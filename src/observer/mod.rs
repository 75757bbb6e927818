//! Execution observers and traces.
//!
//! An [`Observer`] is notified when a worker enters and leaves a node, and
//! when a branch fails to resolve. Observers are called synchronously from
//! worker tasks, so implementations must be cheap and thread-safe.
//!
//! - [`NoopObserver`]: the default, ignores everything
//! - [`TraceRecorder`]: records events into an [`ExecutionTrace`]
//! - [`LoggingObserver`]: forwards events to `tracing`

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::execution::BranchFault;

/// Name of the pseudo-task traced around the `on_done` callback.
pub const DONE_CALLBACK_NAME: &str = "Done Callback";

/// Receives state entry/exit notifications during a run.
///
/// Calls for one node never overlap. Calls for different nodes on
/// concurrent branches may interleave.
pub trait Observer: Send + Sync {
    /// A worker is about to run `node`'s action.
    fn on_entry(&self, _node: &str) {}

    /// `node`'s action returned.
    fn on_exit(&self, _node: &str) {}

    /// `node`'s transition could not be resolved.
    fn on_fault(&self, _node: &str, _fault: &BranchFault) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Which notification a [`TraceEvent`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TracePhase {
    Entry,
    Exit,
    Fault,
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub node: String,
    pub phase: TracePhase,
}

/// Ordered list of recorded events. Read-only once taken from a recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    /// All events in arrival order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Names of executed states, taken from exit events.
    pub fn executed(&self) -> Vec<&str> {
        self.names(TracePhase::Exit)
    }

    /// Names of entered states.
    pub fn entered(&self) -> Vec<&str> {
        self.names(TracePhase::Entry)
    }

    /// Names of nodes whose transition faulted.
    pub fn faults(&self) -> Vec<&str> {
        self.names(TracePhase::Fault)
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn names(&self, phase: TracePhase) -> Vec<&str> {
        self.events
            .iter()
            .filter(|event| event.phase == phase)
            .map(|event| event.node.as_str())
            .collect()
    }
}

/// Observer that records events for later inspection.
///
/// [`TraceRecorder::new`] keeps exit and fault events only, which yields the
/// sequence of executed states. [`TraceRecorder::with_entries`] also keeps
/// entry events.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Mutex<Vec<TraceEvent>>,
    record_entries: bool,
}

impl TraceRecorder {
    /// Record exits and faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entries, exits and faults.
    pub fn with_entries() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            record_entries: true,
        }
    }

    /// Copy out everything recorded so far.
    pub fn trace(&self) -> ExecutionTrace {
        let events = self
            .events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default();
        ExecutionTrace { events }
    }

    /// Names of executed states recorded so far.
    pub fn executed(&self) -> Vec<String> {
        self.trace()
            .executed()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn record(&self, node: &str, phase: TracePhase) {
        if let Ok(mut events) = self.events.lock() {
            events.push(TraceEvent {
                node: node.to_string(),
                phase,
            });
        }
    }
}

impl Observer for TraceRecorder {
    fn on_entry(&self, node: &str) {
        if self.record_entries {
            self.record(node, TracePhase::Entry);
        }
    }

    fn on_exit(&self, node: &str) {
        self.record(node, TracePhase::Exit);
    }

    fn on_fault(&self, node: &str, _fault: &BranchFault) {
        self.record(node, TracePhase::Fault);
    }
}

/// Observer that logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_entry(&self, node: &str) {
        debug!(node = %node, "entering state");
    }

    fn on_exit(&self, node: &str) {
        debug!(node = %node, "leaving state");
    }

    fn on_fault(&self, node: &str, fault: &BranchFault) {
        warn!(node = %node, fault = %fault, "branch resolution fault");
    }
}
