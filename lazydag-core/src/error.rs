//! Error Types
//!
//! Failures that can surface from evaluating the graph. Contract violations
//! made while *building* the graph (wrong arity, futures from another graph)
//! are programming errors and panic instead.

use thiserror::Error;

use crate::graph::VertexId;

/// Failure type returned by [`Operation::execute`](crate::Operation::execute).
pub type OperationError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DagError>;

/// Errors produced while materializing or maintaining the graph.
#[derive(Debug, Error)]
pub enum DagError {
    /// A user-supplied operation failed. Nothing downstream of `vertex` was
    /// cached; everything that completed before the failure stays cached.
    #[error("operation `{operation}` on vertex {vertex} failed: {source}")]
    OperationFailed {
        vertex: VertexId,
        operation: String,
        #[source]
        source: OperationError,
    },

    /// A raw vertex id did not name a vertex in the registry.
    #[error("vertex {0} not found")]
    UnknownVertex(VertexId),

    /// A value vertex was found without its retained value.
    #[error("value vertex {0} lost its retained value")]
    LostValue(VertexId),

    /// The owning graph is gone and the future holds no local value.
    #[error("graph has been dropped")]
    GraphDropped,

    /// An operation called back into the graph that is evaluating it.
    #[error("graph is already in use; operations must not re-enter it")]
    Reentrant,

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
