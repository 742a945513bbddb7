//! Call tree builder error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building a call tree.
///
/// All variants are recoverable: the caller may retry `build_tree`, and a
/// failed attempt is never cached.
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    #[error("call tree worker is unavailable")]
    WorkerUnavailable,

    #[error("call tree build timed out after {0:?}")]
    Timeout(Duration),

    #[error("call tree worker failed: {0}")]
    Worker(String),
}

/// Result type alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
