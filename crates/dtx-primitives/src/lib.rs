//! # dtx-primitives
//!
//! Primitive types shared by every dtx crate.
//!
//! This crate provides:
//! - Identifiers for transactions, unit tasks and generations
//! - The snowflake-style [`UniqueIdGenerator`]
//! - Lock modes
//! - Totally ordered float keys usable as range-lock keys

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod id_gen;
mod ids;
mod lock_mode;
mod ordered_float;

pub use error::{PrimitiveError, PrimitiveResult};
pub use id_gen::{Clock, SystemClock, UniqueIdGenerator, COUNTER_BITS, DTX_EPOCH_MS, RESERVED_BITS};
pub use ids::{GenerationId, TaskId, TxnId};
pub use lock_mode::LockMode;
pub use ordered_float::{OrderedF32, OrderedF64};
