//! Common error types for primitives

use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Lock mode name not recognised
    #[error("unknown lock mode: {0}")]
    UnknownLockMode(String),

    /// Float key is NaN
    #[error("NaN cannot be used as a lock key")]
    NanKey,
}

/// Result type for primitive operations
pub type PrimitiveResult<T> = Result<T, PrimitiveError>;
