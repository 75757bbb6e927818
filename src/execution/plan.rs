//! Compilation of a graph into a runnable plan.
//!
//! [`compile`] freezes a [`Graph`]'s nodes and ordered edge lists, binds them
//! to one [`ExecutionContext`] and one pair of terminal callbacks, and records
//! node 0 as the entry state. The resulting [`CompiledGraph`] is consumed by
//! the executor, so each compiled instance runs at most once.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::context::ExecutionContext;
use crate::core::graph::{Graph, GraphError};
use crate::core::task::TaskUnit;
use crate::core::types::{NodeId, RunId, Target};

use super::latch::TerminalLatch;

/// A frozen node of a compiled plan.
pub(crate) struct PlanNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) unit: Arc<dyn TaskUnit>,
    pub(crate) conditional: bool,
    pub(crate) edges: Vec<Target>,
    /// Held for the duration of the node's action.
    pub(crate) running: Mutex<()>,
}

/// A graph bound to a context and terminal callbacks, ready to run once.
pub struct CompiledGraph {
    pub(crate) run_id: RunId,
    pub(crate) graph_name: String,
    pub(crate) entry: NodeId,
    pub(crate) nodes: Arc<[PlanNode]>,
    pub(crate) context: Arc<ExecutionContext>,
    pub(crate) latch: Arc<TerminalLatch>,
}

impl CompiledGraph {
    /// Identifier of the run this plan will perform.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Name of the source graph.
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// The starting node.
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Number of nodes in the plan.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a successfully compiled plan.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Display name of a node.
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.index()).map(|node| node.name.as_str())
    }

    /// Outgoing edges of a node, in registration order.
    pub fn edges(&self, id: NodeId) -> Option<&[Target]> {
        self.nodes.get(id.index()).map(|node| node.edges.as_slice())
    }

    /// The context this plan is bound to.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }
}

/// Compile `graph` into a single-use plan.
///
/// The graph can keep being modified or compiled again afterwards; each
/// compilation takes its own copy of the structure. Task units are shared
/// with the graph through their `Arc` handles rather than borrowed, so the
/// plan stays `'static` and can move onto a spawned task.
pub fn compile<D, E>(
    graph: &Graph,
    context: Arc<ExecutionContext>,
    on_done: D,
    on_error: E,
) -> Result<CompiledGraph, GraphError>
where
    D: FnOnce() + Send + 'static,
    E: FnOnce() + Send + 'static,
{
    let entry = graph.entry().ok_or(GraphError::EmptyGraph)?;

    let nodes: Arc<[PlanNode]> = graph
        .nodes()
        .map(|node| PlanNode {
            id: node.id,
            name: node.name().to_string(),
            unit: Arc::clone(&node.unit),
            conditional: node.conditional,
            edges: node.edges.clone(),
            running: Mutex::new(()),
        })
        .collect();

    Ok(CompiledGraph {
        run_id: RunId::new(),
        graph_name: graph.name().to_string(),
        entry,
        nodes,
        context,
        latch: Arc::new(TerminalLatch::new(Box::new(on_done), Box::new(on_error))),
    })
}
