//! Unit tasks supplied by callers

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Output of a task that completed normally
pub type TaskOutput = Bytes;

/// Returned by [`UnitTask::run`] to abandon the transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("abort: {message}")]
pub struct AbortSignal {
    message: String,
}

impl AbortSignal {
    /// Create an abort signal
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Reason given by the task
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Returned by [`UnitTask::rollback`] when compensation did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rollback failed: {message}")]
pub struct RollbackFailure {
    message: String,
}

impl RollbackFailure {
    /// Create a rollback failure
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Reason given by the task
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A unit of work with a compensating action
///
/// Tasks sharing a priority form one generation and run in parallel.
/// Generations run in ascending priority order.
pub trait UnitTask: Send + Sync + 'static {
    /// Wave this task belongs to
    fn priority(&self) -> u32;

    /// Forward action
    fn run(&self) -> Result<TaskOutput, AbortSignal>;

    /// Compensating action, run when the transaction rolls back
    fn rollback(&self) -> Result<(), RollbackFailure>;

    /// Whether to run the compensation again after `failures` failed attempts
    fn should_retry_rollback(&self, _failures: u32) -> bool {
        false
    }
}

type RunFn = Box<dyn Fn() -> Result<TaskOutput, AbortSignal> + Send + Sync>;
type RollbackFn = Box<dyn Fn() -> Result<(), RollbackFailure> + Send + Sync>;

/// A [`UnitTask`] built from closures
pub struct FnTask {
    priority: u32,
    run: RunFn,
    rollback: RollbackFn,
    rollback_retries: u32,
}

impl FnTask {
    /// Create a task with a no-op compensation
    pub fn new<F>(priority: u32, run: F) -> Self
    where
        F: Fn() -> Result<TaskOutput, AbortSignal> + Send + Sync + 'static,
    {
        Self {
            priority,
            run: Box::new(run),
            rollback: Box::new(|| Ok(())),
            rollback_retries: 0,
        }
    }

    /// Set the compensating action
    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: Fn() -> Result<(), RollbackFailure> + Send + Sync + 'static,
    {
        self.rollback = Box::new(rollback);
        self
    }

    /// Allow `retries` more compensation attempts after the first failure
    pub fn with_rollback_retries(mut self, retries: u32) -> Self {
        self.rollback_retries = retries;
        self
    }
}

impl UnitTask for FnTask {
    fn priority(&self) -> u32 {
        self.priority
    }

    fn run(&self) -> Result<TaskOutput, AbortSignal> {
        (self.run)()
    }

    fn rollback(&self) -> Result<(), RollbackFailure> {
        (self.rollback)()
    }

    fn should_retry_rollback(&self, failures: u32) -> bool {
        failures <= self.rollback_retries
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("priority", &self.priority)
            .field("rollback_retries", &self.rollback_retries)
            .finish()
    }
}
