//! Error types for the execution engine

use dtx_primitives::{GenerationId, TxnId};
use thiserror::Error;

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Task priority is lower than the newest generation
    #[error("priority {priority} is below the current generation {current}")]
    PriorityRegression {
        /// Priority of the rejected task
        priority: u32,
        /// Priority of the tail generation
        current: u32,
    },

    /// Book-keeping sealed, no more tasks accepted
    #[error("transaction {0} is sealed")]
    Sealed(TxnId),

    /// Transaction aborted, no more tasks accepted
    #[error("transaction {0} aborted")]
    Aborted(TxnId),

    /// Generation already linked to a successor
    #[error("generation {0} is closed")]
    GenerationClosed(GenerationId),

    /// Generation aborted
    #[error("generation {0} aborted")]
    GenerationAborted(GenerationId),

    /// Worker pool could not be created
    #[error("executor error: {0}")]
    Executor(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for execution operations
pub type ExecuteResult<T> = Result<T, ExecuteError>;
