//! Exactly-once terminal callbacks.
//!
//! Any number of workers may reach `DONE` or `ERROR` concurrently. The first
//! one to win the compare-and-set owns the terminal: it records the outcome
//! and takes the matching callback. Every later arrival is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use super::outcome::RunOutcome;

/// Callback fired when a run reaches a terminal.
pub type TerminalCallback = Box<dyn FnOnce() + Send + 'static>;

/// Guards the pair of terminal callbacks for one run.
pub(crate) struct TerminalLatch {
    fired: AtomicBool,
    outcome: OnceLock<RunOutcome>,
    on_done: Mutex<Option<TerminalCallback>>,
    on_error: Mutex<Option<TerminalCallback>>,
}

impl TerminalLatch {
    pub(crate) fn new(on_done: TerminalCallback, on_error: TerminalCallback) -> Self {
        Self {
            fired: AtomicBool::new(false),
            outcome: OnceLock::new(),
            on_done: Mutex::new(Some(on_done)),
            on_error: Mutex::new(Some(on_error)),
        }
    }

    /// Try to claim the terminal for `outcome`.
    ///
    /// Returns the callback to invoke when this caller won the latch, and
    /// `None` when a terminal already fired. `RunOutcome::Halted` never
    /// claims anything.
    pub(crate) fn claim(&self, outcome: RunOutcome) -> Option<TerminalCallback> {
        let slot = match outcome {
            RunOutcome::Done => &self.on_done,
            RunOutcome::Error(_) => &self.on_error,
            RunOutcome::Halted => return None,
        };

        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let _ = self.outcome.set(outcome);
        slot.lock().ok().and_then(|mut callback| callback.take())
    }

    /// Whether a terminal has fired.
    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// The outcome recorded by the winning claim.
    pub(crate) fn outcome(&self) -> RunOutcome {
        self.outcome.get().cloned().unwrap_or(RunOutcome::Halted)
    }
}
