//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport failure from the page-fetch collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed response (invalid JSON, missing page payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Well-formed response reporting an upstream failure (`ok == false`).
    #[error("upstream rejected the request: {0}")]
    Rejected(String),

    /// A single page kept failing until the retry budget ran out. Terminal
    /// for the whole sync; records accumulated before this page remain
    /// available through the last emitted snapshot.
    #[error("page {page} failed after {attempts} attempts: {cause}")]
    PageFailed {
        /// 1-based number of the page that could not be fetched.
        page: u64,
        /// Number of attempts made for that page.
        attempts: u32,
        /// Last observed failure cause.
        cause: String,
    },

    /// Operation refused while a sync is in flight.
    #[error("engine is busy: cannot {operation} while a sync is running")]
    Busy {
        /// The operation that was refused.
        operation: String,
    },
}

impl SyncError {
    /// Returns true if this error can be retried.
    ///
    /// Every per-page collaborator failure is retriable and handled
    /// identically regardless of cause; only the terminal and
    /// precondition errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Protocol(_) | SyncError::Rejected(_) => true,
            SyncError::PageFailed { .. } | SyncError::Busy { .. } => false,
        }
    }
}
