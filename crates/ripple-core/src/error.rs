//! Error types for ripple-core.

use thiserror::Error;

/// Result type for ripple-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ripple-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse cell source.
    #[error("parse error: {0}")]
    Parse(String),

    /// Cyclic dependency detected in the cell graph.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with the kernel process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The kernel process died or is unreachable.
    #[error("kernel died: {0}")]
    KernelDied(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
