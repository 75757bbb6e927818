//! Core identifier types for the engine.
//!
//! Node ids are dense indices assigned in registration order. The two
//! terminal destinations live outside the node-id space as variants of
//! [`Target`], so a working state can never be confused with `DONE` or
//! `ERROR`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a node within a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

/// Unique identifier for one compiled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

/// Destination of an edge: another node or one of the two terminal sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Continue at a registered node.
    Node(NodeId),
    /// Successful completion. Fires `on_done`.
    Done,
    /// Failed completion. Fires `on_error`.
    Error,
}

/// Reserved edge target that ends the run successfully.
pub const DONE: Target = Target::Done;

/// Reserved edge target that ends the run with a failure.
pub const ERROR: Target = Target::Error;

impl NodeId {
    /// Create a NodeId from a raw index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self::new(index)
    }
}

impl RunId {
    /// Generate a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Target {
    /// Whether this target ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Target::Done | Target::Error)
    }

    /// The node this target points at, if it is not a sentinel.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Target::Node(id) => Some(*id),
            Target::Done | Target::Error => None,
        }
    }
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Node(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(id) => write!(f, "{}", id),
            Target::Done => f.write_str("DONE"),
            Target::Error => f.write_str("ERROR"),
        }
    }
}
