//! Conditional task-graph execution.
//!
//! A [`Graph`] is a directed graph of task units. Ordinary nodes run their
//! action and follow their single outgoing edge. Conditional nodes pick one of
//! their ordered edges by index. Two sentinel targets, [`DONE`] and [`ERROR`],
//! end a run and fire exactly one of two callbacks.
//!
//! ```ignore
//! use std::sync::Arc;
//! use branchflow::{DONE, ERROR, ExecutionContext, Executor, Graph, compile};
//!
//! let mut graph = Graph::new("checkout");
//! let check = graph.add_node(Arc::new(CheckStock), true);
//! let ship = graph.add_node(Arc::new(Ship), false);
//! graph.add_edges(check, &[ERROR, ship.into()])?;
//! graph.add_edges(ship, &[DONE])?;
//!
//! let plan = compile(&graph, Arc::new(ExecutionContext::default()), on_done, on_error)?;
//! let report = Executor::new(4).run(plan).wait().await?;
//! ```

pub mod config;
pub mod core;
pub mod execution;
pub mod observer;
pub mod testing;

pub use crate::config::{ConfigError, EngineConfig, FailurePolicy};
pub use crate::core::context::{ContextError, ExecutionContext, ResultAccumulator};
pub use crate::core::graph::{Graph, GraphError, GraphNode, GraphSnapshot, NodeSnapshot};
pub use crate::core::task::{TaskError, TaskUnit};
pub use crate::core::types::{DONE, ERROR, NodeId, RunId, Target};
pub use crate::execution::{
    BranchFault, CompiledGraph, ErrorCause, ExecutionError, Executor, HaltReason, RunHandle,
    RunOutcome, RunReport, TerminalCallback, compile, run,
};
pub use crate::observer::{
    DONE_CALLBACK_NAME, ExecutionTrace, LoggingObserver, NoopObserver, Observer, TraceEvent,
    TracePhase, TraceRecorder,
};
