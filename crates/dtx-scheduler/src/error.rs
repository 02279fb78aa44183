//! Error types for the scheduler

use crate::config::KeyType;
use dtx_lock::LockError;
use dtx_primitives::{PrimitiveError, TxnId};
use thiserror::Error;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Range names a table that is not configured
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Range key does not match the table's key type
    #[error("table {table} expects {expected} keys, got {found}")]
    KeyTypeMismatch {
        /// Table name
        table: String,
        /// Configured key type
        expected: KeyType,
        /// Key type of the request
        found: KeyType,
    },

    /// Unsupported key type in configuration
    #[error("unknown key type: {0}")]
    UnknownKeyType(String),

    /// Table configured twice
    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    /// Transaction id already registered
    #[error("transaction {0} already scheduled")]
    DuplicateTransaction(TxnId),

    /// Transaction not found
    #[error("transaction {0} not found")]
    TxnNotFound(TxnId),

    /// Unallocated stage is full
    #[error("unallocated queue is full")]
    QueueFull,

    /// Scheduler already started
    #[error("scheduler already running")]
    AlreadyRunning,

    /// Scheduler stopped, stage channels closed
    #[error("scheduler stopped")]
    Stopped,

    /// Invalid range
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Invalid key
    #[error("key error: {0}")]
    Primitive(#[from] PrimitiveError),

    /// Malformed configuration
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
