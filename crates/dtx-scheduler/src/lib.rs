//! # dtx-scheduler
//!
//! Transaction admission for the dtx coordinator.
//!
//! Transactions move through three stages:
//! - **Unallocated**: waiting in a bounded queue for the allocation loop
//! - **Parked**: ranges requested, some still queued behind other
//!   transactions
//! - **Ready**: every range granted, handed to the consumer of
//!   [`Scheduler::start`]
//!
//! Completed transactions go through a release stage that returns their
//! ranges and may wake parked transactions.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod resource;
mod scheduler;
mod transaction;

pub use config::{load_resources, parse_resources, KeyType, ResourceConfig, SchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use resource::{create_table, KeyValue, LockTable, RangeRequest, ResourceManager, TableKey};
pub use scheduler::{FailedTransaction, Scheduler};
pub use transaction::{Transaction, TxnStage};
