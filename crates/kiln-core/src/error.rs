//! Domain-specific error types following panic-free policy.

use crate::SessionId;
use thiserror::Error;

/// Errors that can occur in history lookups.
///
/// Only lookups made on behalf of external callers produce errors; internal
/// updates against a missing session (a benign race across a restart) are
/// silent no-ops in the repository instead.
#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    /// Session not found in the history document
    #[error("session not found: {id}")]
    SessionNotFound { id: SessionId },
}

/// Result type for history lookups.
pub type HistoryResult<T> = Result<T, HistoryError>;
