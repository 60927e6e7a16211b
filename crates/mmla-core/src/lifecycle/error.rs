//! Error types for lifecycle operations.
//!
//! A blocked or illegal transition is not an error; it is `Ok(false)`.

use mmla_state::StorageError;
use thiserror::Error;

use crate::graph::CompileError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("node not found: {node_id}")]
    NotFound { node_id: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The persisted document no longer forms a valid tree.
    #[error("stored specification is invalid: {0}")]
    InvalidDocument(#[from] CompileError),

    /// The store reported a commit without running the edit to completion.
    #[error("store finished an update of {node_id} without evaluating it")]
    Unevaluated { node_id: String },
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
