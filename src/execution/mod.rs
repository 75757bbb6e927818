//! Graph execution.
//!
//! [`compile`] turns a [`Graph`](crate::core::graph::Graph) into a
//! single-use [`CompiledGraph`], and an [`Executor`] runs it on a bounded
//! worker pool until a terminal fires or every branch halts.

mod engine;
mod latch;
mod outcome;
mod plan;

pub use engine::{Executor, RunHandle, run};
pub use latch::TerminalCallback;
pub use outcome::{BranchFault, ErrorCause, ExecutionError, HaltReason, RunOutcome, RunReport};
pub use plan::{CompiledGraph, compile};
