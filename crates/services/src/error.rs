//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::SessionStateError;
use storage::repository::StorageError;

/// Errors emitted by the session controller and runtime.
///
/// Network failures never appear here: backend calls are best-effort and
/// recovered locally (fall back to the local violation count, let the next
/// heartbeat retry the push). Only local-state and persistence failures are
/// worth stopping for.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] SessionStateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode submission payload: {0}")]
    Encode(#[from] serde_json::Error),
}
