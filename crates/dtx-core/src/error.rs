//! Error types for the coordinator

use dtx_execute::ExecuteError;
use dtx_primitives::TxnId;
use dtx_scheduler::SchedulerError;
use thiserror::Error;

/// Coordinator errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Transaction unknown or already retired
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxnId),

    /// Transaction rejected while allocating its ranges
    #[error("transaction {txn} failed allocation: {reason}")]
    AllocationFailed {
        /// Transaction id
        txn: TxnId,
        /// Reason reported by the scheduler
        reason: String,
    },

    /// Coordinator already started
    #[error("coordinator already running")]
    AlreadyRunning,

    /// Coordinator stopped before the outcome was known
    #[error("coordinator stopped")]
    Stopped,

    /// Scheduler error
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Execution error
    #[error("execution error: {0}")]
    Execute(#[from] ExecuteError),

    /// Malformed configuration
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for coordinator operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::AllocationFailed {
            txn: TxnId::new(4),
            reason: "unknown table: orders".into(),
        };
        assert!(err.to_string().contains("txn#4"));
        assert!(err.to_string().contains("orders"));

        let err: CoreError = SchedulerError::QueueFull.into();
        assert!(err.to_string().contains("full"));
    }
}
