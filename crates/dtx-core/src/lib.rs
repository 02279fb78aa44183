//! # dtx-core
//!
//! Caller-facing coordinator for dtx.
//!
//! A [`Coordinator`] admits transactions through the range-lock scheduler,
//! buffers their unit tasks until every range is granted, runs them in
//! generations and releases the ranges once the outcome is known.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod coordinator;
mod error;

pub use config::{CoordinatorConfig, ExecutorConfig};
pub use coordinator::Coordinator;
pub use error::{CoreError, CoreResult};

pub use dtx_execute::{AbortSignal, FnTask, RollbackFailure, TransactionOutcome, UnitTask};
pub use dtx_metrics::MetricsSnapshot;
pub use dtx_primitives::{LockMode, TxnId};
pub use dtx_scheduler::{KeyType, RangeRequest, ResourceConfig, SchedulerConfig};
