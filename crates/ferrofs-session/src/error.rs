//! Error taxonomy for the session subsystem.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by session bookkeeping operations.
///
/// Nothing here is fatal to the process: resource exhaustion fails the
/// caller's request and leaves the connection consistent, and backend
/// failures during teardown are logged, never retried.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A per-connection table is at capacity and cannot accept another
    /// locker or fd entry.
    #[error("resource exhausted: {what} limit of {limit} reached")]
    ResourceExhausted {
        /// Which table or resource hit its limit.
        what: &'static str,
        /// The configured limit.
        limit: usize,
    },

    /// Lookup or resolution miss. Expected during normal operation and
    /// not logged as an error.
    #[error("not found")]
    NotFound,

    /// The storage backend reported a failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
