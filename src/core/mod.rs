//! Core graph model: identifiers, task units, contexts and graphs.

pub mod context;
pub mod graph;
pub mod task;
pub mod types;
