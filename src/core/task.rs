//! Task unit trait and error types.
//!
//! A [`TaskUnit`] is the pluggable work item attached to a graph node. The
//! engine only depends on this contract; what a unit actually computes
//! (interpolation, trajectory generation, ...) is opaque to it.

use async_trait::async_trait;
use thiserror::Error;

use super::context::ExecutionContext;
use super::types::NodeId;

/// Errors a task unit can report.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// `select_branch` was called on a unit that has no branch logic.
    #[error("task '{0}' does not implement branch selection")]
    NotConditional(String),

    /// Error accessing the execution context.
    #[error("context error: {0}")]
    Context(#[from] super::context::ContextError),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The capability every node's work item implements.
///
/// Non-conditional nodes call [`act`](TaskUnit::act). Conditional nodes call
/// [`select_branch`](TaskUnit::select_branch) instead, which both performs
/// the node's work and returns the zero-based index of the outgoing edge to
/// follow.
///
/// # Example
///
/// ```ignore
/// use branchflow::{ExecutionContext, NodeId, TaskError, TaskUnit};
/// use async_trait::async_trait;
///
/// struct CheckInput;
///
/// #[async_trait]
/// impl TaskUnit for CheckInput {
///     fn name(&self) -> &str {
///         "Check Input"
///     }
///
///     async fn act(&self, _ctx: &ExecutionContext, _node: NodeId) -> Result<(), TaskError> {
///         Ok(())
///     }
///
///     async fn select_branch(
///         &self,
///         ctx: &ExecutionContext,
///         _node: NodeId,
///     ) -> Result<i32, TaskError> {
///         // 0 -> ERROR, 1 -> next step
///         Ok(if ctx.payload().is_null() { 0 } else { 1 })
///     }
/// }
/// ```
#[async_trait]
pub trait TaskUnit: Send + Sync {
    /// Display name, used for tracing and graph dumps.
    fn name(&self) -> &str;

    /// Perform the node's work.
    async fn act(&self, ctx: &ExecutionContext, node: NodeId) -> Result<(), TaskError>;

    /// Perform the node's work and choose the outgoing edge.
    ///
    /// Only called for nodes registered as conditional. An index outside the
    /// node's edge list is a scheduler fault and routes the run to `ERROR`.
    async fn select_branch(
        &self,
        _ctx: &ExecutionContext,
        _node: NodeId,
    ) -> Result<i32, TaskError> {
        Err(TaskError::NotConditional(self.name().to_string()))
    }

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}
