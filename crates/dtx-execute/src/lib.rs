//! # dtx-execute
//!
//! Execution engine for the dtx coordinator.
//!
//! A transaction's unit tasks are grouped into generations by priority.
//! Generations run one after another; the tasks of one generation run in
//! parallel on a [`TaskExecutor`]. When a task aborts, its generation
//! compensates every task that ran and the rollback walks back through the
//! earlier generations.
//!
//! Features:
//! - [`UnitTask`] capability trait and the [`FnTask`] closure bundle
//! - [`TaskHandle`] per-task state machine
//! - [`Generation`] wave state machine with explicit task buckets
//! - [`TransactionBookKeeping`] chain orchestration and outcome delivery

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bookkeeping;
mod error;
mod executor;
mod generation;
mod handle;
mod task;

pub use bookkeeping::{OutcomeListener, TransactionBookKeeping, TransactionOutcome};
pub use error::{ExecuteError, ExecuteResult};
pub use executor::{Job, ManualExecutor, RayonExecutor, TaskExecutor, DEFAULT_WORKER_THREADS};
pub use generation::{BucketCounts, Generation, GenerationObserver, GenerationStatus};
pub use handle::{TaskHandle, TaskStatus};
pub use task::{AbortSignal, FnTask, RollbackFailure, TaskOutput, UnitTask};
