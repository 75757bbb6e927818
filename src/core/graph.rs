//! Graph builder for conditional task graphs.
//!
//! Nodes get dense ids starting at 0 in registration order, and the first
//! node registered is the entry point. A non-conditional node owns at most
//! one outgoing edge. A conditional node owns an ordered edge list, and the
//! index its task unit returns selects which edge to follow.
//!
//! Validation here is purely structural. Reachability, acyclicity and the
//! existence of target nodes are not checked; a bad target only surfaces at
//! run time as a branch resolution fault.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskUnit;
use super::types::{NodeId, Target};

/// Errors raised while building or compiling a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// An edge was added from a node that was never registered.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A non-conditional node would end up with more than one outgoing edge.
    #[error(
        "node '{name}' ({node}) is not conditional: it has {existing} outgoing edge(s) and cannot take {requested} more"
    )]
    TooManyEdges {
        node: NodeId,
        name: String,
        existing: usize,
        requested: usize,
    },

    /// Compilation was attempted on a graph without nodes.
    #[error("graph has no nodes")]
    EmptyGraph,
}

/// A node in the graph.
#[derive(Clone)]
pub struct GraphNode {
    /// The node id.
    pub id: NodeId,

    /// The work item, shared with the caller.
    pub unit: Arc<dyn TaskUnit>,

    /// Whether the node selects its successor at run time.
    pub conditional: bool,

    /// Outgoing edges in registration order.
    pub edges: Vec<Target>,
}

impl GraphNode {
    /// Display name of the node's task unit.
    pub fn name(&self) -> &str {
        self.unit.name()
    }
}

/// A mutable graph of task units.
///
/// Task units are shared, not borrowed: the graph holds an `Arc` to each
/// unit, and every compiled plan holds another. The same unit may appear in
/// several graphs and serve concurrent runs.
#[derive(Clone)]
pub struct Graph {
    /// Human-readable name.
    name: String,

    /// Nodes indexed by id.
    nodes: Vec<GraphNode>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Get the graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The entry node, if any node has been registered.
    pub fn entry(&self) -> Option<NodeId> {
        self.nodes.first().map(|node| node.id)
    }

    /// Register a node and return its id.
    pub fn add_node(&mut self, unit: Arc<dyn TaskUnit>, conditional: bool) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(GraphNode {
            id,
            unit,
            conditional,
            edges: Vec::new(),
        });
        id
    }

    /// Append outgoing edges to `from`.
    ///
    /// For conditional nodes the targets are appended in order, and repeated
    /// calls accumulate. For non-conditional nodes the total across all calls
    /// may not exceed one edge; a rejected call leaves the node unchanged.
    pub fn add_edges(&mut self, from: NodeId, targets: &[Target]) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(from.index())
            .ok_or(GraphError::UnknownNode(from))?;

        if !node.conditional && node.edges.len() + targets.len() > 1 {
            return Err(GraphError::TooManyEdges {
                node: from,
                name: node.name().to_string(),
                existing: node.edges.len(),
                requested: targets.len(),
            });
        }

        node.edges.extend_from_slice(targets);
        Ok(())
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    /// Get the outgoing edges of a node.
    pub fn edges(&self, id: NodeId) -> Option<&[Target]> {
        self.node(id).map(|node| node.edges.as_slice())
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Serializable view of the graph structure.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            name: self.name.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeSnapshot {
                    id: node.id,
                    name: node.name().to_string(),
                    conditional: node.conditional,
                    edges: node.edges.clone(),
                })
                .collect(),
        }
    }

    /// Render the graph as Graphviz DOT.
    ///
    /// Conditional nodes are drawn as diamonds and their edges are labelled
    /// with the branch index that selects them.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_dot(&mut out);
        out
    }

    fn write_dot(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "digraph \"{}\" {{", escape(&self.name))?;
        for node in &self.nodes {
            let shape = if node.conditional { "diamond" } else { "box" };
            writeln!(
                out,
                "  n{} [label=\"{}\", shape={}];",
                node.id,
                escape(node.name()),
                shape
            )?;
        }

        let targets_done = self.nodes.iter().any(|n| n.edges.contains(&Target::Done));
        let targets_error = self.nodes.iter().any(|n| n.edges.contains(&Target::Error));
        if targets_done {
            writeln!(out, "  done [label=\"DONE\", shape=doublecircle];")?;
        }
        if targets_error {
            writeln!(out, "  error [label=\"ERROR\", shape=doublecircle];")?;
        }

        for node in &self.nodes {
            for (index, target) in node.edges.iter().enumerate() {
                let to = match target {
                    Target::Node(id) => format!("n{}", id),
                    Target::Done => "done".to_string(),
                    Target::Error => "error".to_string(),
                };
                if node.conditional {
                    writeln!(
                        out,
                        "  n{} -> {} [style=dashed, label=\"{}\"];",
                        node.id, to, index
                    )?;
                } else {
                    writeln!(out, "  n{} -> {};", node.id, to)?;
                }
            }
        }
        writeln!(out, "}}")
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Serializable description of a graph, for external visualization tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Graph name.
    pub name: String,
    /// Nodes in id order.
    pub nodes: Vec<NodeSnapshot>,
}

/// One node of a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub conditional: bool,
    pub edges: Vec<Target>,
}
