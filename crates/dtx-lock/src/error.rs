//! Error types for lock tables

use thiserror::Error;

/// Lock table errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Range whose left key is greater than its right key
    #[error("invalid range: left {left} is greater than right {right}")]
    InvalidRange {
        /// Left key, debug-formatted
        left: String,
        /// Right key, debug-formatted
        right: String,
    },
}

/// Result type for lock table operations
pub type LockResult<T> = Result<T, LockError>;
